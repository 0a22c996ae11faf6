//! Server-sent event streams
//!
//! `GET /stream/workflow/:workflow_id`, `GET /stream/file/:file_id` and
//! `GET /stream/user/:user_id` attach a subscription and forward its events
//! as `text/event-stream`. Entry events carry the entry id as the SSE `id`,
//! so a reconnecting browser resumes through `Last-Event-ID`.

use super::error::ApiError;
use axum::extract::{Extension, Path, Query};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream};
use pipstream_core::{
    AttachOptions, AttachedStream, EntryId, EventKind, OutboundEvent, Relay, StreamTarget,
};
use serde::Deserialize;
use std::convert::Infallible;

const LAST_EVENT_ID: &str = "last-event-id";

/// Query parameters accepted on attach
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Last entry id the client saw
    pub after: Option<String>,
    /// Poll workflow status alongside the log (workflow streams only)
    pub include_status: Option<bool>,
}

/// Create stream routes
pub fn stream_routes() -> Router {
    Router::new()
        .route("/stream/workflow/:workflow_id", get(stream_workflow))
        .route("/stream/file/:file_id", get(stream_file))
        .route("/stream/user/:user_id", get(stream_user))
}

async fn stream_workflow(
    Extension(relay): Extension<Relay>,
    Path(workflow_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    attach(&relay, StreamTarget::Workflow(workflow_id), &query, &headers)
}

async fn stream_file(
    Extension(relay): Extension<Relay>,
    Path(file_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    attach(&relay, StreamTarget::File(file_id), &query, &headers)
}

async fn stream_user(
    Extension(relay): Extension<Relay>,
    Path(user_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    attach(&relay, StreamTarget::User(user_id), &query, &headers)
}

fn attach(
    relay: &Relay,
    target: StreamTarget,
    query: &StreamQuery,
    headers: &HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let options = AttachOptions {
        after: resume_position(query, headers)?,
        include_status: query.include_status.unwrap_or(true),
    };
    let attached = relay.attach(target, options)?;

    Ok((
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        sse_response(attached),
    ))
}

/// `after` wins over `Last-Event-ID`; both parse as entry ids.
fn resume_position(query: &StreamQuery, headers: &HeaderMap) -> Result<Option<EntryId>, ApiError> {
    let raw = match &query.after {
        Some(after) => Some(after.as_str()),
        None => headers
            .get(LAST_EVENT_ID)
            .and_then(|value| value.to_str().ok()),
    };
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(Some(raw.parse::<EntryId>()?)),
        None => Ok(None),
    }
}

/// Forward an attached stream until its `disconnected` event.
///
/// Dropping the response body (client went away) drops the
/// [`AttachedStream`], which stops the subscription.
pub fn sse_response(
    attached: AttachedStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream::unfold(attached, |mut attached| async move {
        let outbound = attached.next().await?;
        Some((Ok(to_sse_event(&outbound)), attached))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse_event(outbound: &OutboundEvent) -> Event {
    let event = Event::default()
        .event(&outbound.wire.event)
        .data(&outbound.wire.data);
    match &outbound.event.kind {
        EventKind::Entry { entry, .. } => event.id(entry.id.to_string()),
        _ => event,
    }
}
