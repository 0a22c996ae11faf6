//! Subscription admin endpoints

use super::error::ApiError;
use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use pipstream_core::{Relay, SubscriptionId, SubscriptionInfo};
use serde::Serialize;

/// Live subscriptions
#[derive(Debug, Serialize)]
pub struct SubscriptionList {
    pub count: usize,
    pub subscriptions: Vec<SubscriptionInfo>,
}

/// Result of a stop request
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub subscription_id: SubscriptionId,
    pub stopped: bool,
}

/// Create subscription admin routes
pub fn subscriptions_routes() -> Router {
    Router::new()
        .route("/stream/subscriptions", get(list_subscriptions))
        .route("/stream/subscriptions/:id", delete(stop_subscription))
}

async fn list_subscriptions(Extension(relay): Extension<Relay>) -> Json<SubscriptionList> {
    let subscriptions = relay.subscriptions();
    Json(SubscriptionList {
        count: subscriptions.len(),
        subscriptions,
    })
}

/// Stopping an unknown or already-stopped subscription answers `stopped: false`.
async fn stop_subscription(
    Extension(relay): Extension<Relay>,
    Path(id): Path<String>,
) -> Result<Json<StopResponse>, ApiError> {
    let id: SubscriptionId = id.parse().map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            format!("malformed subscription id '{}'", id),
        )
    })?;

    let stopped = relay.stop(&id);
    Ok(Json(StopResponse {
        subscription_id: id,
        stopped,
    }))
}
