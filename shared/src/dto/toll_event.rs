use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Emitted by the toll processor the moment a vehicle exits a toll zone
/// (or transitions directly into another). Consumed by the billing worker.
#[derive(Debug, Clone, Validate, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TollEvent {
    /// Unique per emission; stable across retries within a single process attempt.
    pub event_id: String,

    #[validate(length(min = 1))]
    pub vehicle_id: String,

    #[validate(length(min = 1))]
    pub device_id: String,

    #[validate(length(min = 1))]
    pub zone_id: String,

    /// epoch milliseconds
    pub entry_time: i64,

    /// epoch milliseconds
    pub exit_time: i64,

    pub distance_km: f64,

    pub rate_per_km: Decimal,

    /// `round_half_up(distance_km * rate_per_km, 2)`
    pub toll_amount: Decimal,

    #[validate(length(equal = 3))]
    pub currency: String,

    /// epoch milliseconds, set at emission time
    pub processed_timestamp: i64,
}
