//! Temporal HTTP API client.

use super::{WorkflowEngine, WorkflowStatus};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Connection settings for [`TemporalHttpEngine`].
#[derive(Debug, Clone)]
pub struct TemporalHttpConfig {
    /// Base URL of the HTTP API, e.g. `https://temporal.example.com`
    pub endpoint: String,
    /// Namespace holding the workflows
    pub namespace: String,
    /// Bearer token, when the endpoint requires one
    pub api_key: Option<SecretString>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// [`WorkflowEngine`] over the Temporal HTTP API.
pub struct TemporalHttpEngine {
    client: Client,
    base: Url,
    namespace: String,
    api_key: Option<SecretString>,
    request_timeout: Duration,
}

impl TemporalHttpEngine {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// `Configuration` if the endpoint is not a valid base URL.
    pub fn new(config: TemporalHttpConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint)
            .map_err(|e| Error::Configuration(format!("invalid workflow endpoint: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "workflow endpoint {} cannot be a base URL",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            namespace: config.namespace,
            api_key: config.api_key,
            request_timeout: config.request_timeout,
        })
    }

    /// `{base}/api/v1/namespaces/{ns}/workflows/{id}/{tail...}` with every
    /// segment percent-encoded.
    fn workflow_url(&self, workflow_id: &str, tail: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Configuration("workflow endpoint cannot be a base URL".to_string()))?;
            segments
                .pop_if_empty()
                .extend(["api", "v1", "namespaces", self.namespace.as_str(), "workflows", workflow_id])
                .extend(tail);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::BackendUnavailable(format!(
                    "workflow engine timed out after {}ms",
                    self.request_timeout.as_millis()
                ))
            } else {
                Error::BackendUnavailable(format!("workflow engine unreachable: {}", e))
            }
        })
    }

    /// Read a JSON body, mapping non-success statuses onto the error taxonomy.
    async fn json_body(
        &self,
        response: Response,
        workflow_id: &str,
        query: Option<&str>,
    ) -> Result<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::BackendUnavailable(format!("workflow engine response: {}", e)))?;

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body)
                .map_err(|e| Error::Workflow(format!("invalid response body: {}", e)));
        }

        Err(classify_failure(status, &body, workflow_id, query))
    }
}

fn classify_failure(status: StatusCode, body: &str, workflow_id: &str, query: Option<&str>) -> Error {
    if status == StatusCode::NOT_FOUND {
        return Error::NotFound(format!("workflow {}", workflow_id));
    }
    if let Some(query) = query {
        if status == StatusCode::BAD_REQUEST && body.to_ascii_lowercase().contains("query") {
            return Error::QueryUnsupported {
                workflow_id: workflow_id.to_string(),
                query: query.to_string(),
            };
        }
    }
    if status.is_server_error() {
        return Error::BackendUnavailable(format!("workflow engine returned {}", status));
    }
    // Only the status goes into the error; bodies may echo request data.
    Error::Workflow(format!("workflow engine returned {}", status))
}

/// Unwrap the first payload of a query result. The HTTP API may return a
/// bare array, a `{payloads: [...]}` wrapper, or the value itself.
fn first_payload(result: Value) -> Value {
    match result {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Object(mut map) if map.contains_key("payloads") => match map.remove("payloads") {
            Some(Value::Array(mut items)) if !items.is_empty() => items.swap_remove(0),
            _ => Value::Null,
        },
        other => other,
    }
}

#[async_trait]
impl WorkflowEngine for TemporalHttpEngine {
    fn name(&self) -> &'static str {
        "temporal"
    }

    #[instrument(skip(self, input))]
    async fn start(
        &self,
        workflow_type: &str,
        input: Value,
        workflow_id: &str,
        task_queue: &str,
    ) -> Result<String> {
        let url = self.workflow_url(workflow_id, &[])?;
        let body = json!({
            "workflowId": workflow_id,
            "workflowType": { "name": workflow_type },
            "taskQueue": { "name": task_queue },
            "input": [input],
        });
        let response = self.send(self.request(Method::POST, url).json(&body)).await?;
        let reply = self.json_body(response, workflow_id, None).await?;
        let run_id = reply
            .get("runId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        debug!(workflow_id, run_id = %run_id, "Workflow started");
        Ok(run_id)
    }

    #[instrument(skip(self))]
    async fn query(&self, workflow_id: &str, query_name: &str) -> Result<Value> {
        let url = self.workflow_url(workflow_id, &["query", query_name])?;
        let body = json!({ "query": { "queryType": query_name } });
        let response = self.send(self.request(Method::POST, url).json(&body)).await?;
        let mut reply = self.json_body(response, workflow_id, Some(query_name)).await?;
        let result = reply
            .get_mut("queryResult")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok(first_payload(result))
    }

    #[instrument(skip(self, payload))]
    async fn signal(&self, workflow_id: &str, signal_name: &str, payload: Value) -> Result<()> {
        let url = self.workflow_url(workflow_id, &["signal", signal_name])?;
        let input = if payload.is_null() { json!([]) } else { json!([payload]) };
        let body = json!({ "signalName": signal_name, "input": input });
        let response = self.send(self.request(Method::POST, url).json(&body)).await?;
        self.json_body(response, workflow_id, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn describe(&self, workflow_id: &str) -> Result<WorkflowStatus> {
        let url = self.workflow_url(workflow_id, &[])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let reply = self.json_body(response, workflow_id, None).await?;
        let status = reply
            .pointer("/workflowExecutionInfo/status")
            .and_then(Value::as_str)
            .map(WorkflowStatus::from_engine)
            .unwrap_or(WorkflowStatus::Unknown);
        Ok(status)
    }

    #[instrument(skip(self))]
    async fn cancel(&self, workflow_id: &str) -> Result<()> {
        let url = self.workflow_url(workflow_id, &["cancel"])?;
        let response = self
            .send(self.request(Method::POST, url).json(&json!({})))
            .await?;
        self.json_body(response, workflow_id, None).await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Configuration("workflow endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["api", "v1", "namespaces", self.namespace.as_str()]);
        let response = self.send(self.request(Method::GET, url)).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::BackendUnavailable(format!("workflow engine returned {}", status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(endpoint: &str) -> TemporalHttpEngine {
        TemporalHttpEngine::new(TemporalHttpConfig {
            endpoint: endpoint.to_string(),
            namespace: "pip-ai.ts7wf".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    #[test]
    fn test_workflow_url_encodes_segments() {
        let engine = engine("https://temporal.example.com/");
        let url = engine
            .workflow_url("analyze-1 2", &["query", "getAnalysisStatus"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://temporal.example.com/api/v1/namespaces/pip-ai.ts7wf/workflows/analyze-1%202/query/getAnalysisStatus"
        );
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let result = TemporalHttpEngine::new(TemporalHttpConfig {
            endpoint: "not a url".to_string(),
            namespace: "default".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, "", "wf", None),
            Error::NotFound(_)
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::BAD_REQUEST,
                "unknown queryType getAnalysisStatus",
                "wf",
                Some("getAnalysisStatus")
            ),
            Error::QueryUnsupported { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, "bad input", "wf", None),
            Error::Workflow(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "", "wf", None),
            Error::BackendUnavailable(_)
        ));
    }

    #[test]
    fn test_first_payload_shapes() {
        assert_eq!(first_payload(json!([{"step": "parse"}])), json!({"step": "parse"}));
        assert_eq!(
            first_payload(json!({"payloads": [{"progress": 40}]})),
            json!({"progress": 40})
        );
        assert_eq!(first_payload(json!({"progress": 40})), json!({"progress": 40}));
        assert_eq!(first_payload(json!({"payloads": []})), Value::Null);
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_backend_unavailable() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let engine = engine("http://127.0.0.1:9");
        let result = engine.query("wf", "getAnalysisStatus").await;
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    }
}
