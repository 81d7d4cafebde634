use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;

/// A geofenced toll zone. Static within a run: the toll processor has no
/// cache-invalidation protocol for zone geometry changing mid-flight.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "toll_zones")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub zone_id: String,

    pub zone_name: String,

    #[sea_orm(column_type = "Decimal(Some((10, 4)))")]
    pub rate_per_km: Decimal,

    #[sea_orm(column_type = "custom(\"geometry\")")]
    pub geom: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
