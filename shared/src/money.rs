use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds `value` to `places` fractional digits using half-up rounding
/// (ties round away from zero), the rule `TollEvent.tollAmount` and
/// `BillingTransaction.amount` are defined by.
///
/// Decimal, not `f64`: `1.5 km * 0.15 $/km` is exactly `0.225` in decimal
/// arithmetic and rounds half-up to `0.23`; the equivalent binary float
/// multiplication lands on `0.22499999999999998` and rounds down to `0.22`.
pub fn round_half_up(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_the_documented_test_vector() {
        let distance_km = dec!(1.5);
        let rate_per_km = dec!(0.15);

        assert_eq!(round_half_up(distance_km * rate_per_km, 2), dec!(0.23));
    }

    #[test]
    fn rounds_down_when_below_midpoint() {
        assert_eq!(round_half_up(dec!(1.241), 2), dec!(1.24));
    }

    #[test]
    fn rounds_up_at_exact_midpoint() {
        assert_eq!(round_half_up(dec!(1.245), 2), dec!(1.25));
    }
}
