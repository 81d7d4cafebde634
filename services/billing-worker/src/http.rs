use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde::Serialize;

use crate::rabbitmq::BillingRabbitmq;

#[derive(Clone)]
pub struct AppState {
    pub rmq: Arc<BillingRabbitmq>,
    pub db: DatabaseConnection,
}

#[derive(Serialize)]
struct ReadinessBody {
    status: &'static str,
    errors: Vec<String>,
}

pub async fn start_server(port: u16, state: AppState) {
    let app = Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .with_state(state);

    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), port);
    tracing::info!(%addr, "http server listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|_| panic!("[WEB] failed to get address {}", addr));

    axum::serve(listener, app.into_make_service())
        .await
        .unwrap_or_else(|_| panic!("[WEB] failed to serve app on address {}", addr))
}

async fn live() -> (StatusCode, &'static str) {
    (StatusCode::OK, "live")
}

/// Checks each external dependency the billing workflow needs in order to
/// make forward progress: the rabbitmq publisher channel and the
/// transaction database pool. The payment gateway has no standing
/// connection to probe (the mock implementation never fails to connect,
/// and a real gateway's availability is only knowable per-call).
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessBody>) {
    let mut errors = Vec::new();

    if !state.rmq.publisher_connected().await {
        errors.push("rabbitmq publisher not connected".to_string());
    }

    if let Err(err) = state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await
    {
        errors.push(format!("postgres error: {err}"));
    }

    if errors.is_empty() {
        (
            StatusCode::OK,
            Json(ReadinessBody {
                status: "ready",
                errors,
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessBody {
                status: "not ready",
                errors,
            }),
        )
    }
}
