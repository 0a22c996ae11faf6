//! Workflow endpoints
//!
//! Thin pass-through to the orchestration engine: start, status, cancel.
//! Every route answers 503 when the `workflow` section is disabled.

use super::error::ApiError;
use super::publish::to_fields;
use axum::extract::{Extension, Path, Query};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pipstream_core::{Fields, Relay, CANCEL_SIGNAL};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Defaults applied to workflow requests
#[derive(Debug, Clone)]
pub struct WorkflowDefaults {
    pub task_queue: String,
}

/// Body of `POST /workflow/start`
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub workflow_type: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub task_queue: Option<String>,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub workflow_id: String,
    pub run_id: String,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub workflow_id: String,
    pub status: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelQuery {
    /// Cancel through the engine instead of signalling the workflow
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub workflow_id: String,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Create workflow routes
pub fn workflow_routes() -> Router {
    Router::new()
        .route("/workflow/start", post(start_workflow))
        .route("/workflow/:workflow_id/status", get(workflow_status))
        .route("/workflow/:workflow_id/cancel", post(cancel_workflow))
}

async fn start_workflow(
    Extension(relay): Extension<Relay>,
    Extension(defaults): Extension<Arc<WorkflowDefaults>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let engine = relay
        .workflow_engine()
        .ok_or_else(ApiError::workflow_disabled)?;

    let workflow_id = request
        .workflow_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("{}-{}", request.workflow_type, Uuid::new_v4()));
    let task_queue = request
        .task_queue
        .unwrap_or_else(|| defaults.task_queue.clone());

    let run_id = engine
        .start(&request.workflow_type, request.input, &workflow_id, &task_queue)
        .await?;
    info!(workflow_id = %workflow_id, run_id = %run_id, workflow_type = %request.workflow_type, "Workflow started");

    let mut fields = Fields::new();
    fields.insert("event_type".to_string(), "workflow_started".to_string());
    fields.insert("step".to_string(), "started".to_string());
    fields.insert("progress".to_string(), "0".to_string());
    fields.insert("workflow_type".to_string(), request.workflow_type);
    relay
        .publisher()
        .publish_workflow_progress(&workflow_id, fields)
        .await?;

    Ok(Json(StartResponse {
        workflow_id,
        run_id,
        status: "started",
        timestamp: Utc::now(),
    }))
}

/// Runs the status query; when the workflow cannot answer it, reports the
/// execution status from `describe` instead.
async fn workflow_status(
    Extension(relay): Extension<Relay>,
    Path(workflow_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let engine = relay
        .workflow_engine()
        .ok_or_else(ApiError::workflow_disabled)?;

    let status = match engine
        .query(&workflow_id, &relay.config().status_query)
        .await
    {
        Ok(status) => status,
        Err(e) => {
            debug!(workflow_id = %workflow_id, error = %e, "Status query failed, falling back to describe");
            let execution = engine.describe(&workflow_id).await?;
            json!({
                "step": "unknown",
                "progress": 0,
                "workflow_status": execution.as_str(),
            })
        }
    };

    Ok(Json(StatusResponse {
        workflow_id,
        status,
        timestamp: Utc::now(),
    }))
}

async fn cancel_workflow(
    Extension(relay): Extension<Relay>,
    Path(workflow_id): Path<String>,
    Query(query): Query<CancelQuery>,
) -> Result<Json<CancelResponse>, ApiError> {
    let engine = relay
        .workflow_engine()
        .ok_or_else(ApiError::workflow_disabled)?;

    if query.force {
        engine.cancel(&workflow_id).await?;
    } else {
        engine
            .signal(&workflow_id, CANCEL_SIGNAL, Value::Null)
            .await?;
    }
    info!(workflow_id = %workflow_id, force = query.force, "Workflow cancel requested");

    let progress = Map::from_iter([
        ("step".to_string(), json!("cancelled")),
        ("progress".to_string(), json!(0)),
        ("message".to_string(), json!("Workflow cancelled by user")),
        ("cancelled".to_string(), json!(true)),
    ]);
    if let Err(e) = relay
        .publisher()
        .publish_workflow_progress(&workflow_id, to_fields(progress))
        .await
    {
        warn!(workflow_id = %workflow_id, error = %e, "Failed to publish cancellation");
    }

    Ok(Json(CancelResponse {
        workflow_id,
        status: "cancel_requested",
        timestamp: Utc::now(),
    }))
}
