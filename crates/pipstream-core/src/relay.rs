//! Relay facade
//!
//! Wires the log, registry, publisher and optional workflow engine
//! together. Transports call [`Relay::attach`] to open a stream and read
//! [`AttachedStream`] until it ends; dropping the stream stops the
//! subscription.

use crate::cursor::CursorTracker;
use crate::error::{Error, Result};
use crate::event::OutboundEvent;
use crate::log::{ChannelKey, EntryId, LogSource};
use crate::publisher::{Publisher, PublisherConfig};
use crate::registry::{RelayRegistry, SubscriptionId, SubscriptionInfo};
use crate::subscription::{StreamTarget, Subscription, SubscriptionConfig};
use crate::workflow::{StatusPoller, WorkflowEngine, DEFAULT_STATUS_QUERY};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Subscription loop tuning
    pub subscription: SubscriptionConfig,
    /// Write-side settings
    pub publisher: PublisherConfig,
    /// Time between workflow status queries
    pub status_interval: Duration,
    /// Query issued by the status poller
    pub status_query: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            subscription: SubscriptionConfig::default(),
            publisher: PublisherConfig::default(),
            status_interval: Duration::from_secs(5),
            status_query: DEFAULT_STATUS_QUERY.to_string(),
        }
    }
}

/// Options for one attach.
#[derive(Debug, Clone, Default)]
pub struct AttachOptions {
    /// Last entry id the client saw; single-channel streams resume after it
    pub after: Option<EntryId>,
    /// Attach the status poller to workflow streams
    pub include_status: bool,
}

/// Connectivity of one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Reachable
    Healthy,
    /// Configured but unreachable
    Disconnected,
    /// Not configured
    Disabled,
}

/// Health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RelayHealth {
    /// `healthy` when every configured backend is reachable, `degraded` otherwise
    pub status: &'static str,
    /// Log backend name
    pub log_backend: &'static str,
    /// Log connectivity
    pub log: ComponentStatus,
    /// Workflow engine connectivity
    pub workflow_engine: ComponentStatus,
    /// Registered subscriptions
    pub active_streams: usize,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

/// An attached client stream.
///
/// Yields formatted events until `disconnected` has been delivered.
/// Dropping it before then stops the subscription.
pub struct AttachedStream {
    id: SubscriptionId,
    events: mpsc::Receiver<OutboundEvent>,
    _guard: StopOnDrop,
}

impl AttachedStream {
    /// Subscription identifier.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, or `None` once the subscription has closed.
    pub async fn next(&mut self) -> Option<OutboundEvent> {
        self.events.recv().await
    }
}

/// Reports transport disconnection to the registry as a stop signal.
struct StopOnDrop {
    registry: Arc<RelayRegistry>,
    id: SubscriptionId,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        if self.registry.stop(&self.id) {
            debug!(subscription_id = %self.id, "Client went away, stopping subscription");
        }
    }
}

/// The relay.
#[derive(Clone)]
pub struct Relay {
    log: Arc<dyn LogSource>,
    registry: Arc<RelayRegistry>,
    publisher: Publisher,
    engine: Option<Arc<dyn WorkflowEngine>>,
    config: RelayConfig,
}

impl Relay {
    /// Create a relay whose subscriptions are cancelled with `root`.
    pub fn new(log: Arc<dyn LogSource>, config: RelayConfig, root: CancellationToken) -> Self {
        let publisher = Publisher::new(log.clone(), config.publisher.clone());
        Self {
            log,
            registry: Arc::new(RelayRegistry::with_root(root)),
            publisher,
            engine: None,
            config,
        }
    }

    /// Attach a workflow engine for status polling and workflow routes.
    #[must_use]
    pub fn with_workflow_engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Subscription table.
    #[must_use]
    pub fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    /// Write side.
    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Workflow engine, when configured.
    #[must_use]
    pub fn workflow_engine(&self) -> Option<&Arc<dyn WorkflowEngine>> {
        self.engine.as_ref()
    }

    /// Active settings.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Open a stream on `target`.
    ///
    /// # Errors
    ///
    /// `ShuttingDown` once shutdown has begun.
    pub fn attach(&self, target: StreamTarget, options: AttachOptions) -> Result<AttachedStream> {
        if self.registry.is_closed() {
            return Err(Error::ShuttingDown);
        }

        let channels = target.channels();
        let cursor = match options.after {
            Some(after) if !target.is_merged() => {
                let positions: BTreeMap<ChannelKey, EntryId> =
                    channels.iter().map(|channel| (channel.clone(), after)).collect();
                CursorTracker::resume(&channels, &positions)
            }
            _ => CursorTracker::new(&channels),
        };

        let id = SubscriptionId::new();
        let token = self.registry.register(id, target.clone(), channels);
        let (tx, rx) = mpsc::channel(self.config.subscription.event_buffer.max(1));

        let mut subscription = Subscription::new(
            id,
            target.clone(),
            cursor,
            self.config.subscription.clone(),
            self.log.clone(),
            self.registry.clone(),
            token,
            tx,
        );
        if options.include_status {
            if let Some(engine) = &self.engine {
                subscription = subscription.with_status_poller(StatusPoller::new(
                    engine.clone(),
                    self.config.status_query.clone(),
                    self.config.status_interval,
                ));
            }
        }

        tokio::spawn(subscription.run());
        info!(subscription_id = %id, target = %target, resume = ?options.after, "Client attached");

        Ok(AttachedStream {
            id,
            events: rx,
            _guard: StopOnDrop {
                registry: self.registry.clone(),
                id,
            },
        })
    }

    /// Stop a subscription. Unknown or already-stopped ids are a no-op.
    pub fn stop(&self, id: &SubscriptionId) -> bool {
        self.registry.stop(id)
    }

    /// Live subscriptions, oldest first.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.registry.list()
    }

    /// Probe the log and workflow engine.
    pub async fn health(&self) -> RelayHealth {
        let log = match self.log.ping().await {
            Ok(()) => ComponentStatus::Healthy,
            Err(e) => {
                debug!(error = %e, "Log health check failed");
                ComponentStatus::Disconnected
            }
        };
        let workflow_engine = match &self.engine {
            None => ComponentStatus::Disabled,
            Some(engine) => match engine.health_check().await {
                Ok(()) => ComponentStatus::Healthy,
                Err(e) => {
                    debug!(error = %e, "Workflow engine health check failed");
                    ComponentStatus::Disconnected
                }
            },
        };

        RelayHealth {
            status: if log == ComponentStatus::Healthy
                && workflow_engine != ComponentStatus::Disconnected
            {
                "healthy"
            } else {
                "degraded"
            },
            log_backend: self.log.name(),
            log,
            workflow_engine,
            active_streams: self.registry.count(),
            timestamp: Utc::now(),
        }
    }
}
