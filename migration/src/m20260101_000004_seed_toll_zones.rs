use sea_orm_migration::{prelude::*, sea_orm::TransactionTrait};

use crate::seeder;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let transaction = db.begin().await?;

        // ZoneA and ZoneB are the fixtures exercised by the toll processor's
        // scenario tests (entry/exit, zone-to-zone transition); their
        // coordinates and rate must stay in sync with those tests.
        let statement = r#"
        insert into "toll_zones" ("zone_id", "zone_name", "rate_per_km", "geom")
        values
            ('ZoneA', 'Downtown Bridge Corridor', 0.15, ST_GeomFromText('POLYGON((-74.01 40.70, -74.00 40.70, -74.00 40.715, -74.01 40.715, -74.01 40.70))', 4326)),
            ('ZoneB', 'Harbor Tunnel Approach', 0.20, ST_GeomFromText('POLYGON((-74.00 40.715, -73.99 40.715, -73.99 40.73, -74.00 40.73, -74.00 40.715))', 4326))
        on conflict ("zone_id") do nothing;
        "#;

        transaction.execute_unprepared(statement).await?;

        seeder::gen_toll_zone(&transaction, "ZoneC", -122.42, 37.77).await?;
        seeder::gen_toll_zone(&transaction, "ZoneD", -87.63, 41.88).await?;

        transaction.commit().await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            r#"delete from "toll_zones" where "zone_id" in ('ZoneA', 'ZoneB', 'ZoneC', 'ZoneD');"#,
        )
        .await?;

        Ok(())
    }
}
