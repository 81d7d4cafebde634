use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use shared::dto::{GpsFix, TollEvent};
use shared::money::round_half_up;

use crate::geofence::Zone;
use crate::state::VehicleState;

const EARTH_RADIUS_KM: f64 = 6371.0;
const MAX_STALENESS_SECS: i64 = 10 * 60;
const MAX_FUTURE_SECS: i64 = 60;
const CURRENCY: &str = "USD";
const TOLL_AMOUNT_PLACES: u32 = 2;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GpsFixValidationError {
    #[error("timestamp {0}ms is too old")]
    TooOld(i64),
    #[error("timestamp {0}ms is too far in the future")]
    TooFarInFuture(i64),
}

/// Validates the freshness window `[now - 10 min, now + 60s]`. Field-level
/// shape (non-empty ids, coordinate ranges, ...) is already enforced by
/// `GpsFix`'s `validator` attributes at decode time; freshness depends on
/// wall-clock time at the moment of validation so it lives here instead,
/// with `now` threaded through rather than read from the clock so tests
/// can pin it.
pub fn validate_freshness(
    fix: &GpsFix,
    now: DateTime<Utc>,
) -> Result<(), GpsFixValidationError> {
    let age_ms = now.timestamp_millis() - fix.timestamp;

    if age_ms > MAX_STALENESS_SECS * 1000 {
        return Err(GpsFixValidationError::TooOld(fix.timestamp));
    }
    if -age_ms > MAX_FUTURE_SECS * 1000 {
        return Err(GpsFixValidationError::TooFarInFuture(fix.timestamp));
    }

    Ok(())
}

/// Great-circle distance between two WGS-84 points, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1r.cos() * lat2r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

fn toll_amount(distance_km: f64, rate_per_km: Decimal) -> Decimal {
    let distance = Decimal::from_f64(distance_km).unwrap_or(Decimal::ZERO);
    round_half_up(distance * rate_per_km, TOLL_AMOUNT_PLACES)
}

fn close_out(vehicle_id: &str, state: &VehicleState, exit_time: i64, final_distance_km: f64, now: DateTime<Utc>) -> TollEvent {
    TollEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        vehicle_id: vehicle_id.to_string(),
        device_id: state.device_id.clone(),
        zone_id: state.zone_id.clone(),
        entry_time: state.entry_time,
        exit_time,
        distance_km: final_distance_km,
        rate_per_km: state.rate_per_km,
        toll_amount: toll_amount(final_distance_km, state.rate_per_km),
        currency: CURRENCY.to_string(),
        processed_timestamp: now.timestamp_millis(),
    }
}

fn enter_zone(fix: &GpsFix, zone: &Zone) -> VehicleState {
    VehicleState {
        in_zone: true,
        zone_id: zone.zone_id.clone(),
        rate_per_km: zone.rate_per_km,
        entry_time: fix.timestamp,
        distance_km: 0.0,
        lat: fix.latitude,
        lon: fix.longitude,
        last_update: fix.timestamp,
        device_id: fix.device_id.clone(),
    }
}

/// Result of folding one GPS fix into a vehicle's tracked state: the
/// state to persist (`None` means delete the key, the vehicle is not
/// currently inside any zone) and zero or one toll events to publish.
/// A zone-to-zone transition is the only case that produces both.
pub struct Outcome {
    pub next_state: Option<VehicleState>,
    pub toll_event: Option<TollEvent>,
}

/// Folds one already-validated GPS fix, the vehicle's prior state (if
/// any), and the zone currently under the fix (if any) into the next
/// state and, possibly, a toll event. Pure function apart from reading
/// `now` and generating `event_id`s, so every branch is unit-testable
/// without a broker, a state store, or a database.
pub fn process_gps_fix(
    fix: &GpsFix,
    prior_state: Option<&VehicleState>,
    current_zone: Option<&Zone>,
    now: DateTime<Utc>,
) -> Outcome {
    match (prior_state, current_zone) {
        // Outside -> Outside: nothing to track.
        (None, None) => Outcome {
            next_state: None,
            toll_event: None,
        },

        // Entry: vehicle was untracked, now inside a zone.
        (None, Some(zone)) => Outcome {
            next_state: Some(enter_zone(fix, zone)),
            toll_event: None,
        },

        // Movement within the same zone, or a re-entry into the same
        // zone after a gap: accumulate distance and move on.
        (Some(prior), Some(zone)) if prior.zone_id == zone.zone_id => {
            let segment_km = haversine_km(prior.lat, prior.lon, fix.latitude, fix.longitude);

            Outcome {
                next_state: Some(VehicleState {
                    in_zone: true,
                    zone_id: prior.zone_id.clone(),
                    rate_per_km: prior.rate_per_km,
                    entry_time: prior.entry_time,
                    distance_km: prior.distance_km + segment_km,
                    lat: fix.latitude,
                    lon: fix.longitude,
                    last_update: fix.timestamp,
                    device_id: prior.device_id.clone(),
                }),
                toll_event: None,
            }
        }

        // Exit: vehicle leaves the zone it was tracked in onto open
        // road. Close out the sojourn and drop the state entry.
        (Some(prior), None) => {
            let segment_km = haversine_km(prior.lat, prior.lon, fix.latitude, fix.longitude);
            let event = close_out(&fix.vehicle_id, prior, fix.timestamp, prior.distance_km + segment_km, now);

            Outcome {
                next_state: None,
                toll_event: Some(event),
            }
        }

        // Transition: vehicle crosses directly from one zone into a
        // different one with no open-road fix in between. Close out
        // the old zone's sojourn and open a new one in the same fold.
        (Some(prior), Some(zone)) => {
            let segment_km = haversine_km(prior.lat, prior.lon, fix.latitude, fix.longitude);
            let event = close_out(&fix.vehicle_id, prior, fix.timestamp, prior.distance_km + segment_km, now);

            Outcome {
                next_state: Some(enter_zone(fix, zone)),
                toll_event: Some(event),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn fix(vehicle_id: &str, ts: i64, lat: f64, lon: f64) -> GpsFix {
        GpsFix {
            device_id: "DEV123".to_string(),
            vehicle_id: vehicle_id.to_string(),
            timestamp: ts,
            latitude: lat,
            longitude: lon,
            speed_kmph: Some(50.0),
            heading: None,
            altitude_meters: None,
            gps_quality: None,
        }
    }

    fn zone(id: &str, rate: Decimal) -> Zone {
        Zone {
            zone_id: id.to_string(),
            rate_per_km: rate,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn distance_between_identical_points_is_zero() {
        assert_eq!(haversine_km(40.7128, -74.0060, 40.7128, -74.0060), 0.0);
    }

    #[test]
    fn distance_one_degree_longitude_at_equator_is_about_111_km() {
        let d = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111.3).abs() < 0.2, "expected ~111.3km, got {d}");
    }

    #[test]
    fn outside_to_outside_is_a_no_op() {
        let f = fix("VEH_ABC", 1_700_000_000_000, 40.720, -74.000);
        let outcome = process_gps_fix(&f, None, None, now());

        assert!(outcome.next_state.is_none());
        assert!(outcome.toll_event.is_none());
    }

    #[test]
    fn entering_a_zone_opens_a_sojourn_with_zero_distance() {
        let entry_time = 1_700_000_000_000;
        let f = fix("VEH_ABC", entry_time, 40.710, -74.005);
        let z = zone("ZoneA", dec!(0.15));

        let outcome = process_gps_fix(&f, None, Some(&z), now());

        let state = outcome.next_state.expect("vehicle should now be tracked");
        assert!(state.in_zone);
        assert_eq!(state.zone_id, "ZoneA");
        assert_eq!(state.rate_per_km, dec!(0.15));
        assert_eq!(state.distance_km, 0.0);
        assert_eq!(state.lat, 40.710);
        assert_eq!(state.lon, -74.005);
        assert_eq!(state.entry_time, entry_time);
        assert_eq!(state.device_id, "DEV123");
        assert!(outcome.toll_event.is_none());
    }

    #[test]
    fn moving_within_the_same_zone_accumulates_distance_without_a_toll_event() {
        let entry_time = 1_700_000_000_000;
        let prior = VehicleState {
            in_zone: true,
            zone_id: "ZoneA".to_string(),
            rate_per_km: dec!(0.15),
            entry_time,
            distance_km: 0.0,
            lat: 40.710,
            lon: -74.005,
            last_update: entry_time,
            device_id: "DEV123".to_string(),
        };
        let f = fix("VEH_ABC", entry_time + 5_000, 40.711, -74.006);
        let z = zone("ZoneA", dec!(0.15));

        let outcome = process_gps_fix(&f, Some(&prior), Some(&z), now());

        let state = outcome.next_state.expect("vehicle stays tracked");
        assert!(state.in_zone);
        assert_eq!(state.zone_id, "ZoneA");
        assert!(state.distance_km > 0.0);
        assert_eq!(state.lat, 40.711);
        assert_eq!(state.lon, -74.006);
        assert_eq!(state.last_update, entry_time + 5_000);
        assert!(outcome.toll_event.is_none());
    }

    #[test]
    fn exiting_a_zone_closes_the_sojourn() {
        let entry_time = 1_700_000_000_000;
        let exit_time = entry_time + 15_000;
        let prior = VehicleState {
            in_zone: true,
            zone_id: "ZoneA".to_string(),
            rate_per_km: dec!(0.15),
            entry_time,
            distance_km: 1.25,
            lat: 40.712,
            lon: -74.007,
            last_update: entry_time + 10_000,
            device_id: "DEV123".to_string(),
        };
        let f = fix("VEH_ABC", exit_time, 40.71425, -74.007);

        let outcome = process_gps_fix(&f, Some(&prior), None, now());

        assert!(outcome.next_state.is_none(), "state must be cleared on exit");
        let event = outcome.toll_event.expect("exit must publish a toll event");
        assert_eq!(event.vehicle_id, "VEH_ABC");
        assert_eq!(event.device_id, "DEV123");
        assert_eq!(event.zone_id, "ZoneA");
        assert_eq!(event.entry_time, entry_time);
        assert_eq!(event.exit_time, exit_time);
        assert_eq!(event.rate_per_km, dec!(0.15));
        assert_eq!(event.currency, "USD");
        assert!(event.distance_km > 1.25);
    }

    #[test]
    fn toll_amount_rounds_half_up_at_the_documented_vector() {
        // 1.5km * 0.15 $/km = 0.225 -> half-up rounds to 0.23, not the
        // 0.22 a naive f64 multiply gives due to representation error.
        assert_eq!(toll_amount(1.5, dec!(0.15)), dec!(0.23));
    }

    #[test]
    fn crossing_directly_into_another_zone_closes_one_sojourn_and_opens_another() {
        let entry_time = 1_700_000_000_000;
        let transition_time = entry_time + 15_000;
        let prior = VehicleState {
            in_zone: true,
            zone_id: "ZoneA".to_string(),
            rate_per_km: dec!(0.15),
            entry_time,
            distance_km: 1.25,
            lat: 40.712,
            lon: -74.007,
            last_update: entry_time + 10_000,
            device_id: "DEV123".to_string(),
        };
        let f = fix("VEH_ABC", transition_time, 40.730, -73.995);
        let z = zone("ZoneB", dec!(0.20));

        let outcome = process_gps_fix(&f, Some(&prior), Some(&z), now());

        let event = outcome.toll_event.expect("transition must close out ZoneA");
        assert_eq!(event.zone_id, "ZoneA");
        assert_eq!(event.exit_time, transition_time);
        assert_eq!(event.rate_per_km, dec!(0.15));

        let state = outcome.next_state.expect("transition must open ZoneB");
        assert!(state.in_zone);
        assert_eq!(state.zone_id, "ZoneB");
        assert_eq!(state.rate_per_km, dec!(0.20));
        assert_eq!(state.distance_km, 0.0, "distance resets on new zone entry");
        assert_eq!(state.lat, 40.730);
        assert_eq!(state.lon, -73.995);
        assert_eq!(state.entry_time, transition_time);
        assert_eq!(state.device_id, "DEV123");
    }

    #[test]
    fn accepts_a_timestamp_that_is_current() {
        let n = now();
        let f = fix("VEH1", n.timestamp_millis(), 40.71, -74.0);
        assert!(validate_freshness(&f, n).is_ok());
    }

    #[test]
    fn accepts_a_timestamp_five_minutes_in_the_past() {
        let n = now();
        let five_min_ago = n.timestamp_millis() - 5 * 60 * 1000;
        let f = fix("VEH1", five_min_ago, 40.71, -74.0);
        assert!(validate_freshness(&f, n).is_ok());
    }

    #[test]
    fn rejects_a_timestamp_eleven_minutes_in_the_past() {
        let n = now();
        let eleven_min_ago = n.timestamp_millis() - 11 * 60 * 1000;
        let f = fix("VEH1", eleven_min_ago, 40.71, -74.0);
        assert_eq!(
            validate_freshness(&f, n),
            Err(GpsFixValidationError::TooOld(eleven_min_ago))
        );
    }

    #[test]
    fn rejects_a_timestamp_two_minutes_in_the_future() {
        let n = now();
        let two_min_ahead = n.timestamp_millis() + 120 * 1000;
        let f = fix("VEH1", two_min_ahead, 40.71, -74.0);
        assert_eq!(
            validate_freshness(&f, n),
            Err(GpsFixValidationError::TooFarInFuture(two_min_ahead))
        );
    }
}
