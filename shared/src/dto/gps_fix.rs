use serde::{Deserialize, Serialize};
use validator::Validate;

/// Raw GPS fix as produced by a vehicle tracker, wire-decoded off the
/// `toll.gps` exchange.
///
/// `timestamp` is epoch milliseconds, UTC. Freshness (must lie within
/// `[now - 10 min, now + 60 s]`) is not expressible with `validator`'s
/// static attributes and is checked by the ingest pipeline instead, since
/// it depends on wall-clock time at the moment of validation.
#[derive(Debug, Clone, Validate, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsFix {
    #[validate(length(min = 1))]
    pub device_id: String,

    #[validate(length(min = 1))]
    pub vehicle_id: String,

    pub timestamp: i64,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    pub speed_kmph: Option<f64>,
    pub heading: Option<f64>,
    pub altitude_meters: Option<f64>,
    pub gps_quality: Option<f64>,
}
