use std::sync::Arc;

use config::AppConfig;
use geofence::PostgisGeofenceIndex;
use http::AppState;
use rabbitmq::GpsIngestRabbitmq;
use shared::errors::ResultExt;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use state::RedisStateStore;

mod config;
mod geofence;
mod http;
mod rabbitmq;
mod state;
mod tracker;

#[tokio::main]
#[allow(clippy::never_loop)]
async fn main() {
    let config = AppConfig::from_env();

    shared::tracer::init_tracing_with_jaeger_otel(config.tracer_service_name.clone(), config.app_debug);

    let state_store: Arc<dyn state::KeyedStateStore> = Arc::new(
        RedisStateStore::new(&config.redis_uri, config.vehicle_state_ttl_secs)
            .unwrap_or_exit_process("failed to build redis state store"),
    );

    let geofence_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database_pool_max)
        .connect(&config.database_url)
        .await
        .unwrap_or_exit_process("failed to connect to geofence database");

    let geofence: Arc<dyn geofence::GeofenceIndex> =
        Arc::new(PostgisGeofenceIndex::from_pool(geofence_pool.clone()));

    let rmq = Arc::new(GpsIngestRabbitmq::new(&config, state_store.clone(), geofence));

    let mut signals = Signals::new([SIGINT, SIGTERM]).expect("failed to setup signals hook");

    let rmq_consumer_ref = rmq.clone();
    tokio::spawn(async move { rmq_consumer_ref.start().await });

    let http_state = AppState {
        rmq: rmq.clone(),
        state_store: state_store.clone(),
        geofence_pool,
    };
    let http_port = config.http_port;
    tokio::spawn(async move { http::start_server(http_port, http_state).await });

    let shutdown_rmq_ref = rmq.clone();
    tokio::spawn(async move {
        for sig in signals.forever() {
            println!("\n[APP] received signal: {}, shutting down", sig);

            shared::tracer::shutdown().await;
            shutdown_rmq_ref.shutdown().await;

            std::process::exit(sig)
        }
    });

    std::future::pending::<()>().await;
}
