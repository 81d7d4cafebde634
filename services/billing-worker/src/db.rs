use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{info, log};

pub async fn create_db_conn(db_url: &str, max_connections: u32) -> DatabaseConnection {
    let mut opt = ConnectOptions::new(db_url);

    opt.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    info!("[DB] getting connection");
    Database::connect(opt)
        .await
        .unwrap_or_else(|_| panic!("[DB] failed to build connection pool"))
}

/// Applies all pending migrations, including `toll_zones` since the
/// toll processor only ever reads from an already-migrated database.
pub async fn run_migrations(db: &DatabaseConnection) {
    info!("[DB] running migrations");
    Migrator::up(db, None)
        .await
        .unwrap_or_else(|_| panic!("[DB] failed to run migrations"));
}
