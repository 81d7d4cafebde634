use geozero::wkb;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::error;

/// A geofenced toll zone resolved by a point lookup: just enough to
/// accumulate distance and price a sojourn. Zones are assumed static
/// within a run; this crate has no cache-invalidation protocol for a
/// `toll_zones` row changing out from under an in-progress sojourn.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Zone {
    pub zone_id: String,
    pub rate_per_km: Decimal,
}

/// Point-in-polygon lookup against `toll_zones`. Failures are fail-safe:
/// on a transient DB error the tracker is told no zone was found rather
/// than erroring out. Better to miss a toll than to double-bill from a
/// half-seen transition.
#[async_trait::async_trait]
pub trait GeofenceIndex: Send + Sync {
    async fn lookup(&self, lat: f64, lon: f64) -> Option<Zone>;
}

pub struct PostgisGeofenceIndex {
    pool: PgPool,
}

impl PostgisGeofenceIndex {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::from_pool(pool))
    }
}

#[async_trait::async_trait]
impl GeofenceIndex for PostgisGeofenceIndex {
    async fn lookup(&self, lat: f64, lon: f64) -> Option<Zone> {
        // ST_MakePoint takes (longitude, latitude).
        let point: geo_types::Geometry<f64> = geo_types::Point::new(lon, lat).into();

        let result = sqlx::query_as::<_, Zone>(
            "SELECT zone_id, rate_per_km \
             FROM toll_zones \
             WHERE ST_Contains(geom, ST_SetSRID($1, 4326)) \
             LIMIT 1",
        )
        .bind(wkb::Encode(point))
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(zone) => zone,
            Err(error) => {
                error!(lat, lon, %error, "geofence lookup failed, treating as outside all zones");
                None
            }
        }
    }
}
