use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;

use crate::rabbitmq::GpsIngestRabbitmq;
use crate::state::KeyedStateStore;

#[derive(Clone)]
pub struct AppState {
    pub rmq: Arc<GpsIngestRabbitmq>,
    pub state_store: Arc<dyn KeyedStateStore>,
    pub geofence_pool: PgPool,
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

/// Checks each external dependency the ingest loop needs in order to make
/// forward progress: the rabbitmq publisher channel, the geofence
/// database pool, and the keyed state store. Any failure is surfaced as
/// a 503 with the list of what's down.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessBody>) {
    let mut errors = Vec::new();

    if !state.rmq.publisher_connected().await {
        errors.push("rabbitmq publisher not connected".to_string());
    }

    if let Err(err) = sqlx::query("SELECT 1").execute(&state.geofence_pool).await {
        errors.push(format!("postgres error: {err}"));
    }

    if let Err(err) = state.state_store.get("__readiness_probe__").await {
        errors.push(format!("redis error: {err}"));
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
