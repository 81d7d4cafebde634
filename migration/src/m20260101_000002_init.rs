use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        let statement = r#"
        create type "transaction_status" as enum (
            'PENDING',
            'PROCESSING',
            'SUCCESS',
            'FAILED',
            'RETRY'
        );

        create table "toll_zones" (
            "zone_id" varchar(255) primary key,
            "zone_name" varchar(255) not null,
            "rate_per_km" numeric(10, 4) not null,
            "geom" geometry(POLYGON, 4326) not null
        );

        create index "ix_toll_zones_geom" on "toll_zones" using gist ("geom");

        create table "billing_transactions" (
            "id" bigserial primary key,
            "toll_event_id" varchar(255) not null,
            "vehicle_id" varchar(255) not null,
            "amount" numeric(10, 2) not null,
            "currency" varchar(3) not null,
            "status" transaction_status not null default 'PENDING',
            "transaction_time" timestamptz(0) not null default now(),
            "last_updated" timestamptz(0) not null default now(),
            "created_at" timestamptz(0) not null default now(),
            "payment_gateway_ref" varchar(255) null,
            "payment_method_details" text null,
            "error_message" text null,
            "retry_count" int not null default 0
        );

        alter table
            "billing_transactions"
        add
            constraint "billing_transactions_toll_event_id_unique" unique ("toll_event_id");

        create index "ix_billing_transactions_vehicle_id" on "billing_transactions" ("vehicle_id");

        create index "ix_billing_transactions_status" on "billing_transactions" ("status");

        create index "ix_billing_transactions_vehicle_id_status" on "billing_transactions" ("vehicle_id", "status");

        create index "ix_billing_transactions_payment_gateway_ref" on "billing_transactions" ("payment_gateway_ref");
        "#;

        db.execute_unprepared(statement).await?;

        Ok(())
    }

    async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
        Err(DbErr::Custom(String::from("cannot be reverted")))
    }
}
