use config::{Config, Environment, File};
use serde::Deserialize;
use std::{env, sync::OnceLock};

#[derive(Deserialize, Debug)]
pub struct AppConfig {
    /// If the application should be run in debug mode and print additional info to stdout
    pub app_debug: bool,

    /// The service name to be used on the tracing spans
    pub tracer_service_name: String,

    /// Rabbitmq uri
    pub rmq_uri: String,

    /// Exchange carrying raw GPS fixes, bound to `gps_queue` under `gps_routing_key`.
    pub gps_exchange: String,

    /// Queue this service consumes GPS fixes from.
    pub gps_queue: String,

    /// Routing key used when binding `gps_queue` to `gps_exchange`.
    pub gps_routing_key: String,

    /// Consumer tag used to identify this service's GPS queue consumer.
    pub gps_consumer_tag: String,

    /// `basic_qos` prefetch count for the GPS consumer.
    pub gps_consumer_prefetch: u16,

    /// Exchange TollEvents are published to.
    pub toll_event_exchange: String,

    /// Exchange poison-pill / unhandled-error envelopes are published to.
    pub error_exchange: String,

    /// Redis endpoint backing the per-vehicle keyed state store.
    pub redis_uri: String,

    /// TTL applied to every `VehicleState` write, in seconds.
    pub vehicle_state_ttl_secs: u64,

    /// Postgres/PostGIS connection string used for the geofence lookup.
    pub database_url: String,

    /// Max connections in the geofence lookup pool.
    pub database_pool_max: u32,

    /// opentelemetry exporter endpoint
    pub otel_exporter_otlp_endpoint: String,

    /// port to open a HTTP server for service healthchecks
    pub http_port: u16,
}

impl AppConfig {
    pub fn from_env() -> AppConfig {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let base_path = env::var("CARGO_MANIFEST_DIR").unwrap_or_default();

        let yaml_config_file = File::with_name(&format!("{base_path}/env/{run_mode}.yaml"))
            .format(config::FileFormat::Yaml)
            .required(false);

        Config::builder()
            .add_source(yaml_config_file)
            .add_source(Environment::default())
            .build()
            .unwrap_or_else(|error| panic!("[CFG] error loading config, {:#?}", error))
            .try_deserialize::<AppConfig>()
            .unwrap_or_else(|error| panic!("[CFG] error deserializing config, {:#?}", error))
    }
}

/// returns a global read only reference to the app configuration
pub fn app_config() -> &'static AppConfig {
    static INSTANCE: OnceLock<AppConfig> = OnceLock::new();
    INSTANCE.get_or_init(AppConfig::from_env)
}
