//! Publish endpoints
//!
//! Used by the upload service and workflow activities to append progress
//! events. Payload values are flattened to strings because log entries are
//! flat string maps.

use super::error::ApiError;
use axum::extract::{Extension, Path};
use axum::routing::post;
use axum::{Json, Router};
use pipstream_core::{ChannelKey, EntryId, Fields, Relay};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /stream/publish`
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    pub event_type: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Publish acknowledgement
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Absent when a best-effort publish was dropped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl PublishResponse {
    fn published(entry_id: Option<EntryId>) -> Self {
        Self {
            status: "published",
            workflow_id: None,
            file_id: None,
            channel: None,
            entry_id: entry_id.map(|id| id.to_string()),
        }
    }
}

/// Create publish routes
pub fn publish_routes() -> Router {
    Router::new()
        .route("/stream/publish", post(publish))
        .route("/stream/publish/workflow/:workflow_id", post(publish_workflow))
        .route("/stream/publish/analysis/:file_id", post(publish_analysis))
}

async fn publish_workflow(
    Extension(relay): Extension<Relay>,
    Path(workflow_id): Path<String>,
    Json(data): Json<Map<String, Value>>,
) -> Result<Json<PublishResponse>, ApiError> {
    let id = relay
        .publisher()
        .publish_workflow_progress(&workflow_id, to_fields(data))
        .await?;
    Ok(Json(PublishResponse {
        workflow_id: Some(workflow_id),
        ..PublishResponse::published(id)
    }))
}

async fn publish_analysis(
    Extension(relay): Extension<Relay>,
    Path(file_id): Path<String>,
    Json(data): Json<Map<String, Value>>,
) -> Result<Json<PublishResponse>, ApiError> {
    let id = relay
        .publisher()
        .publish_analysis_progress(&file_id, to_fields(data))
        .await?;
    Ok(Json(PublishResponse {
        file_id: Some(file_id),
        ..PublishResponse::published(id)
    }))
}

async fn publish(
    Extension(relay): Extension<Relay>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let channel = ChannelKey::new(request.channel)?;
    let id = relay
        .publisher()
        .publish(&channel, &request.event_type, to_fields(request.fields))
        .await?;
    Ok(Json(PublishResponse {
        channel: Some(channel.to_string()),
        ..PublishResponse::published(id)
    }))
}

/// Strings pass through; everything else is stored as its JSON text.
pub fn to_fields(data: Map<String, Value>) -> Fields {
    data.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_fields_flattens_values() {
        let data = json!({
            "step": "parse",
            "progress": 40,
            "cancelled": false,
            "detail": {"pages": 3},
            "note": null
        });
        let Value::Object(map) = data else {
            panic!("expected object");
        };
        let fields = to_fields(map);

        assert_eq!(fields["step"], "parse");
        assert_eq!(fields["progress"], "40");
        assert_eq!(fields["cancelled"], "false");
        assert_eq!(fields["detail"], r#"{"pages":3}"#);
        assert_eq!(fields["note"], "null");
    }

    #[test]
    fn test_response_omits_unset_ids() {
        let body = serde_json::to_value(PublishResponse {
            workflow_id: Some("wf-1".to_string()),
            ..PublishResponse::published(None)
        })
        .unwrap();
        assert_eq!(body, json!({"status": "published", "workflow_id": "wf-1"}));
    }
}
