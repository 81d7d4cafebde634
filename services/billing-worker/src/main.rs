use std::{sync::Arc, time::Duration};

use config::AppConfig;
use http::AppState;
use payment::MockPaymentGateway;
use rabbitmq::BillingRabbitmq;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};

mod billing;
mod config;
mod db;
mod http;
mod payment;
mod rabbitmq;

#[tokio::main]
#[allow(clippy::never_loop)]
async fn main() {
    let config = AppConfig::from_env();

    shared::tracer::init_tracing_with_jaeger_otel(config.tracer_service_name.clone(), config.app_debug);

    let db_conn = db::create_db_conn(&config.database_url, config.database_pool_max).await;
    db::run_migrations(&db_conn).await;

    let gateway: Box<dyn payment::PaymentGateway> = Box::new(MockPaymentGateway::new(
        config.mock_payment_fail_rate,
        Duration::from_secs(config.payment_gateway_timeout_secs),
    ));

    let rmq = Arc::new(BillingRabbitmq::new(&config, db_conn.clone(), gateway));

    let mut signals = Signals::new([SIGINT, SIGTERM]).expect("failed to setup signals hook");

    let rmq_consumer_ref = rmq.clone();
    tokio::spawn(async move { rmq_consumer_ref.start().await });

    let http_state = AppState {
        rmq: rmq.clone(),
        db: db_conn,
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
