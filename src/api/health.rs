//! Health check endpoints.
//!
//! Provides:
//! - `/health`: simple "healthy" + version (for load balancers)
//! - `/stream/health`: log backend and workflow engine connectivity plus
//!   the number of active streams

use axum::extract::Extension;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use pipstream_core::{Relay, RelayHealth};
use serde::Serialize;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Simple health check (for load balancers)
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Relay health: `healthy` only when every configured backend answers
async fn stream_health(Extension(relay): Extension<Relay>) -> Json<RelayHealth> {
    Json(relay.health().await)
}

/// Create health routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stream/health", get(stream_health))
}
