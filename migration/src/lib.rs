pub use sea_orm_migration::prelude::*;

mod m20260101_000001_install_extensions;
mod m20260101_000002_init;
mod m20260101_000003_last_updated_trigger;
mod m20260101_000004_seed_toll_zones;
mod seeder;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_install_extensions::Migration),
            Box::new(m20260101_000002_init::Migration),
            Box::new(m20260101_000003_last_updated_trigger::Migration),
            Box::new(m20260101_000004_seed_toll_zones::Migration),
        ]
    }
}
