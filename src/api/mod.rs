//! Web API module for pipstream
//!
//! Provides HTTP endpoints for:
//! - Server-sent event streams (workflow, file, per-user)
//! - Publishing progress events
//! - Subscription administration
//! - Workflow status and cancellation
//! - Health checks

pub mod error;
pub mod health;
pub mod publish;
pub mod stream;
pub mod subscriptions;
pub mod workflow;

use axum::{Extension, Router};
use pipstream_core::Relay;
use std::sync::Arc;

pub use error::ApiError;
pub use health::health_routes;
pub use publish::publish_routes;
pub use stream::stream_routes;
pub use subscriptions::subscriptions_routes;
pub use workflow::{workflow_routes, WorkflowDefaults};

/// Create the API router with all endpoints
pub fn api_router(relay: Relay, defaults: WorkflowDefaults) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(stream_routes())
        .merge(publish_routes())
        .merge(subscriptions_routes())
        .merge(workflow_routes())
        .layer(Extension(relay))
        .layer(Extension(Arc::new(defaults)))
}
