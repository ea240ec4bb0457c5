//! Gateway server built on axum.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::GatewayConfig;
use crate::store::{AlertStore, spawn_recent_history};

/// State shared by all gateway handlers.
#[derive(Debug)]
pub struct GatewayState {
    store: Arc<AlertStore>,
    history_limit: usize,
    started_at: DateTime<Utc>,
}

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayState>;

impl GatewayState {
    pub fn new(store: Arc<AlertStore>, history_limit: usize) -> Self {
        Self {
            store,
            history_limit,
            started_at: Utc::now(),
        }
    }

    pub fn shared(store: Arc<AlertStore>, history_limit: usize) -> SharedGateway {
        Arc::new(Self::new(store, history_limit))
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }

    /// Uptime in seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_seconds().max(0) as u64
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

/// Build an axum Router with `/alerts`, `/history` and `/health` routes.
pub fn router(shared: SharedGateway) -> Router {
    Router::new()
        .route("/alerts", get(alerts_handler))
        .route("/history", get(history_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// The volatile alert timeline, oldest first.
async fn alerts_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    Json(gw.store.all_volatile())
}

/// Recent durable alerts, newest first.
async fn history_handler(
    State(gw): State<SharedGateway>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let limit = params.limit.unwrap_or(gw.history_limit);
    match spawn_recent_history(&gw.store, limit).await {
        Ok(history) => Json(serde_json::json!({ "history": history })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "History query failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "alerts": gw.store.len(),
        "uptime_secs": gw.uptime_secs(),
    }))
}

/// Serve the gateway until the listener fails or the task is cancelled.
pub async fn run(config: &GatewayConfig, gw: SharedGateway) -> Result<(), std::io::Error> {
    let app = router(gw);
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    tracing::info!(addr = %config.addr(), "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
