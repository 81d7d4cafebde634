use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Per-vehicle sojourn state, keyed by `vehicleId` in the state store.
/// Only ever stored while the vehicle is inside a zone: a zone exit
/// deletes the entry rather than flipping `in_zone` to `false`, so a
/// `get` returning `None` and a `get` returning `Some(state)` with
/// `in_zone == false` mean the same thing to callers. The field is kept
/// anyway because it is part of the documented record shape and makes a
/// raw dump of the store self-describing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    pub in_zone: bool,
    pub zone_id: String,
    pub rate_per_km: Decimal,

    /// epoch milliseconds
    pub entry_time: i64,

    pub distance_km: f64,
    pub lat: f64,
    pub lon: f64,

    /// epoch milliseconds, always >= entry_time
    pub last_update: i64,

    pub device_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("state store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
}

/// Durable per-vehicle state with TTL, exclusively owned by the zone
/// tracker. Corrupt or unparseable values are treated as absent rather
/// than surfaced as an error, the same fail-toward-missing-the-toll
/// policy the geofence lookup uses on a DB error: better to silently
/// start a fresh sojourn than to crash or wedge a partition on a bad
/// record nobody can recover.
#[async_trait::async_trait]
pub trait KeyedStateStore: Send + Sync {
    async fn get(&self, vehicle_id: &str) -> Result<Option<VehicleState>, StateStoreError>;
    async fn put(&self, vehicle_id: &str, state: &VehicleState) -> Result<(), StateStoreError>;
    async fn delete(&self, vehicle_id: &str) -> Result<(), StateStoreError>;
}

pub struct RedisStateStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisStateStore {
    pub fn new(redis_uri: &str, ttl_secs: u64) -> Result<Self, StateStoreError> {
        Ok(Self {
            client: redis::Client::open(redis_uri)?,
            ttl_secs,
        })
    }

    fn key(vehicle_id: &str) -> String {
        format!("vehicle_state:{vehicle_id}")
    }

    async fn connection(&self) -> Result<redis::aio::ConnectionManager, StateStoreError> {
        Ok(self.client.get_tokio_connection_manager().await?)
    }
}

#[async_trait::async_trait]
impl KeyedStateStore for RedisStateStore {
    async fn get(&self, vehicle_id: &str) -> Result<Option<VehicleState>, StateStoreError> {
        let mut conn = self.connection().await?;
        let key = Self::key(vehicle_id);

        let raw: Option<String> = conn.get(&key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<VehicleState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(error) => {
                warn!(vehicle_id, %error, "corrupt vehicle state, deleting and treating as absent");
                if let Err(delete_error) = conn.del::<_, ()>(&key).await {
                    error!(vehicle_id, %delete_error, "failed to delete corrupt vehicle state key");
                }
                Ok(None)
            }
        }
    }

    async fn put(&self, vehicle_id: &str, state: &VehicleState) -> Result<(), StateStoreError> {
        let mut conn = self.connection().await?;
        let raw = serde_json::to_string(state).expect("VehicleState always serializes");

        conn.set_ex::<_, _, ()>(Self::key(vehicle_id), raw, self.ttl_secs)
            .await?;

        Ok(())
    }

    async fn delete(&self, vehicle_id: &str) -> Result<(), StateStoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::key(vehicle_id)).await?;
        Ok(())
    }
}
