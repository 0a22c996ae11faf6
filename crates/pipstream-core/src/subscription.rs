//! Subscription
//!
//! One client-visible stream. A subscription owns its channel set and
//! cursors and runs as its own task, moving through
//!
//! ```text
//! Connecting -> Streaming -> Draining -> Closed
//! ```
//!
//! Every stream kind (single workflow, single file, merged per-user feed)
//! shares this shape; only the channel set and the [`EventFilter`] differ.
//! Events leave through a bounded channel as [`OutboundEvent`]s; a closed
//! receiver counts as a stop signal.

use crate::cursor::CursorTracker;
use crate::error::Error;
use crate::event::{EventKind, Fields, OutboundEvent, RelayEvent};
use crate::log::{global_channels, ChannelKey, LogEntry, LogSource};
use crate::registry::{RelayRegistry, SubscriptionId};
use crate::workflow::StatusPoller;
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a client attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StreamTarget {
    /// Progress of one workflow
    Workflow(String),
    /// Analysis progress of one file
    File(String),
    /// Every global feed entry addressed to one user
    User(String),
}

impl StreamTarget {
    /// Identifier the client addressed.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Workflow(id) | Self::File(id) | Self::User(id) => id,
        }
    }

    /// Payload key naming the identifier in `connected`/`disconnected`.
    #[must_use]
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Workflow(_) => "workflow_id",
            Self::File(_) => "file_id",
            Self::User(_) => "user_id",
        }
    }

    /// Channels this stream reads.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelKey> {
        match self {
            Self::Workflow(id) => vec![ChannelKey::workflow(id)],
            Self::File(id) => vec![ChannelKey::file(id)],
            Self::User(_) => global_channels(),
        }
    }

    /// Filter applied before emission.
    #[must_use]
    pub fn filter(&self) -> EventFilter {
        match self {
            Self::Workflow(_) | Self::File(_) => EventFilter::All,
            Self::User(user_id) => EventFilter::Subscriber(user_id.clone()),
        }
    }

    /// Event type used when an entry carries none.
    #[must_use]
    pub fn default_event_type(&self) -> &'static str {
        match self {
            Self::Workflow(_) => "progress",
            Self::File(_) => "analysis",
            Self::User(_) => "notification",
        }
    }

    /// Workflow whose status can be polled, if any.
    #[must_use]
    pub fn workflow_id(&self) -> Option<&str> {
        match self {
            Self::Workflow(id) => Some(id),
            Self::File(_) | Self::User(_) => None,
        }
    }

    /// Whether the stream merges several channels.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workflow(id) => write!(f, "workflow:{}", id),
            Self::File(id) => write!(f, "file:{}", id),
            Self::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Predicate deciding which consumed entries are emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Emit everything
    All,
    /// Emit entries addressed to one user
    Subscriber(String),
}

impl EventFilter {
    /// Whether an entry with `fields` passes.
    ///
    /// An entry belongs to user `u` when its `user_id` is `u`, or its
    /// `workflow_id` or `file_id` is scoped under `user:u:`.
    #[must_use]
    pub fn matches(&self, fields: &Fields) -> bool {
        let user_id = match self {
            Self::All => return true,
            Self::Subscriber(user_id) => user_id,
        };

        if fields.get("user_id").is_some_and(|v| v == user_id) {
            return true;
        }
        let scope = format!("user:{}:", user_id);
        ["workflow_id", "file_id"]
            .iter()
            .any(|key| fields.get(*key).is_some_and(|v| v.starts_with(&scope)))
    }
}

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Long-poll timeout of each read
    pub poll_timeout: Duration,
    /// Pause after every cycle
    pub cycle_delay: Duration,
    /// Entries per channel per read for single-channel streams
    pub read_count: usize,
    /// Entries per channel per read for merged streams
    pub merged_read_count: usize,
    /// Capacity of the outbound event channel
    pub event_buffer: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            cycle_delay: Duration::from_millis(100),
            read_count: 10,
            merged_read_count: 5,
            event_buffer: 64,
        }
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Cursors seeded, `connected` not yet sent
    Connecting,
    /// Polling and emitting
    Streaming,
    /// Tearing down; only `disconnected` remains
    Draining,
    /// Finished
    Closed,
}

/// One attached client stream.
pub struct Subscription {
    id: SubscriptionId,
    target: StreamTarget,
    channels: Vec<ChannelKey>,
    cursor: CursorTracker,
    filter: EventFilter,
    state: SubscriptionState,
    config: SubscriptionConfig,
    log: Arc<dyn LogSource>,
    registry: Arc<RelayRegistry>,
    token: CancellationToken,
    events: mpsc::Sender<OutboundEvent>,
    poller: Option<StatusPoller>,
    poller_task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Subscription {
    /// Build a subscription that is already registered under `id` with
    /// `token`. Use [`crate::relay::Relay::attach`] rather than calling this
    /// directly.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SubscriptionId,
        target: StreamTarget,
        cursor: CursorTracker,
        config: SubscriptionConfig,
        log: Arc<dyn LogSource>,
        registry: Arc<RelayRegistry>,
        token: CancellationToken,
        events: mpsc::Sender<OutboundEvent>,
    ) -> Self {
        let channels = target.channels();
        let filter = target.filter();
        Self {
            id,
            target,
            channels,
            cursor,
            filter,
            state: SubscriptionState::Connecting,
            config,
            log,
            registry,
            token,
            events,
            poller: None,
            poller_task: None,
        }
    }

    /// Attach a status poller. Ignored for targets without a workflow.
    #[must_use]
    pub fn with_status_poller(mut self, poller: StatusPoller) -> Self {
        if self.target.workflow_id().is_some() {
            self.poller = Some(poller);
        }
        self
    }

    /// Subscription identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Drive the state machine to `Closed`.
    pub async fn run(mut self) -> SubscriptionState {
        loop {
            let next = match self.state {
                SubscriptionState::Connecting => self.connect().await,
                SubscriptionState::Streaming => self.stream().await,
                SubscriptionState::Draining => self.drain().await,
                SubscriptionState::Closed => break,
            };
            debug!(
                subscription_id = %self.id,
                from = ?self.state,
                to = ?next,
                "Subscription state transition"
            );
            self.state = next;
        }
        self.state
    }

    async fn connect(&mut self) -> SubscriptionState {
        let connected = EventKind::Connected {
            subscription_id: self.id,
            target: self.target.clone(),
        };
        if !self.emit(connected).await {
            return SubscriptionState::Draining;
        }

        if let (Some(poller), Some(workflow_id)) = (self.poller.clone(), self.target.workflow_id()) {
            let token = self.token.child_token();
            let handle = tokio::spawn(run_status_poller(
                poller,
                workflow_id.to_string(),
                self.events.clone(),
                token.clone(),
            ));
            self.poller_task = Some((token, handle));
        }

        info!(
            subscription_id = %self.id,
            target = %self.target,
            channels = self.channels.len(),
            "Subscription streaming"
        );
        SubscriptionState::Streaming
    }

    async fn stream(&mut self) -> SubscriptionState {
        let limit = if self.target.is_merged() {
            self.config.merged_read_count
        } else {
            self.config.read_count
        };

        loop {
            if self.token.is_cancelled() {
                return SubscriptionState::Draining;
            }

            let positions = self.cursor.read_positions();
            let batch = match self.log.read(&positions, limit, self.config.poll_timeout).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(
                        subscription_id = %self.id,
                        backend = self.log.name(),
                        error = %e,
                        "Log read failed, closing subscription"
                    );
                    self.emit(EventKind::Error {
                        message: e.client_message(),
                    })
                    .await;
                    return SubscriptionState::Draining;
                }
            };

            if self.token.is_cancelled() {
                return SubscriptionState::Draining;
            }

            for (channel, entries) in batch {
                for entry in entries {
                    if let Err(e) = self.cursor.advance(&channel, entry.id) {
                        self.invariant_violated(&e);
                        self.emit(EventKind::Error {
                            message: e.client_message(),
                        })
                        .await;
                        return SubscriptionState::Draining;
                    }
                    if !self.filter.matches(&entry.fields) {
                        continue;
                    }
                    if !self.emit(self.entry_event(entry)).await {
                        return SubscriptionState::Draining;
                    }
                }
            }

            tokio::select! {
                _ = self.token.cancelled() => return SubscriptionState::Draining,
                _ = tokio::time::sleep(self.config.cycle_delay) => {}
            }
        }
    }

    async fn drain(&mut self) -> SubscriptionState {
        if let Some((token, handle)) = self.poller_task.take() {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(subscription_id = %self.id, error = %e, "Status poller task failed");
            }
        }

        // The token is already cancelled here, so `emit` would give up at once.
        // A stalled client gets at most `poll_timeout` to make room.
        if let Some(outbound) = self.encode(EventKind::Disconnected {
            subscription_id: self.id,
            target: self.target.clone(),
        }) {
            match tokio::time::timeout(self.config.poll_timeout, self.events.send(outbound)).await
            {
                Ok(Ok(())) => {}
                Ok(Err(_)) => debug!(subscription_id = %self.id, "Client transport closed"),
                Err(_) => warn!(
                    subscription_id = %self.id,
                    "Client not reading; dropping disconnected event"
                ),
            }
        }

        self.registry.unregister(&self.id);
        info!(
            subscription_id = %self.id,
            target = %self.target,
            cursors = ?self.cursor.snapshot(),
            "Subscription closed"
        );
        SubscriptionState::Closed
    }

    fn entry_event(&self, entry: LogEntry) -> EventKind {
        let event_type = entry
            .event_type()
            .unwrap_or(self.target.default_event_type())
            .to_string();
        EventKind::Entry { event_type, entry }
    }

    fn invariant_violated(&self, e: &Error) {
        error!(
            subscription_id = %self.id,
            error = %e,
            cursors = ?self.cursor.snapshot(),
            backtrace = %Backtrace::force_capture(),
            "Cursor invariant violated"
        );
    }

    fn encode(&self, kind: EventKind) -> Option<OutboundEvent> {
        match OutboundEvent::encode(RelayEvent::now(kind)) {
            Ok(outbound) => Some(outbound),
            Err(e) => {
                warn!(subscription_id = %self.id, error = %e, "Dropping event that failed to format");
                None
            }
        }
    }

    /// Format and send one event. Returns false once the receiver is gone or
    /// the subscription is stopped while the client is not reading.
    /// An event that fails to format is skipped and counts as sent.
    async fn emit(&self, kind: EventKind) -> bool {
        let Some(outbound) = self.encode(kind) else {
            return true;
        };
        tokio::select! {
            biased;
            sent = self.events.send(outbound) => {
                if sent.is_err() {
                    debug!(subscription_id = %self.id, "Client transport closed");
                    self.token.cancel();
                    return false;
                }
                true
            }
            _ = self.token.cancelled() => {
                debug!(subscription_id = %self.id, "Stopped while client buffer was full");
                false
            }
        }
    }
}

/// Status poller task: one query per interval until cancelled.
async fn run_status_poller(
    poller: StatusPoller,
    workflow_id: String,
    events: mpsc::Sender<OutboundEvent>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(poller.interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let status = tokio::select! {
            _ = token.cancelled() => break,
            status = poller.poll(&workflow_id) => status,
        };
        let Some(status) = status else {
            continue;
        };

        let event = RelayEvent::now(EventKind::WorkflowStatus {
            workflow_id: workflow_id.clone(),
            status,
        });
        let outbound = match OutboundEvent::encode(event) {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(workflow_id = %workflow_id, error = %e, "Dropping status that failed to format");
                continue;
            }
        };

        tokio::select! {
            _ = token.cancelled() => break,
            sent = events.send(outbound) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    debug!(workflow_id = %workflow_id, "Status poller stopped");
}

#[cfg(test)]
mod tests;
