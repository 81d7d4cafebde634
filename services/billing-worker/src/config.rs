use std::{env, sync::OnceLock};

use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct AppConfig {
    /// If the application should be run in debug mode and print additional info to stdout
    pub app_debug: bool,

    /// The service name to be used on the tracing spans
    pub tracer_service_name: String,

    /// Rabbitmq uri
    pub rmq_uri: String,

    /// Exchange carrying TollEvents, bound to `toll_event_queue` under `toll_event_routing_key`.
    pub toll_event_exchange: String,

    /// Queue this service consumes TollEvents from.
    pub toll_event_queue: String,

    /// Routing key used when binding `toll_event_queue` to `toll_event_exchange`.
    pub toll_event_routing_key: String,

    /// Consumer tag used to identify this service's TollEvent queue consumer.
    pub toll_event_consumer_tag: String,

    /// `basic_qos` prefetch count for the TollEvent consumer.
    pub toll_event_consumer_prefetch: u16,

    /// Exchange PaymentResults are published to.
    pub payment_result_exchange: String,

    /// Exchange poison-pill / unhandled-error envelopes are published to.
    pub error_exchange: String,

    /// Postgres connection string for `billing_transactions`.
    pub database_url: String,

    /// Max connections in the billing transaction pool.
    pub database_pool_max: u32,

    /// Probability (0.0-1.0) the mock payment gateway fails a charge outright.
    pub mock_payment_fail_rate: f64,

    /// Ceiling on how long a single payment gateway call may run before
    /// it's treated as a `GW_TIMEOUT` failure.
    pub payment_gateway_timeout_secs: u64,

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
