//! Relay Registry
//!
//! Process-wide table of live subscriptions keyed by [`SubscriptionId`].
//! Each entry carries the subscription's cancellation token; stopping a
//! subscription cancels that token, and the subscription's own run loop
//! removes the entry once it has drained.
//!
//! Every token is a child of the registry's root token, so cancelling the
//! root (process shutdown) stops every subscription at once.

use crate::log::ChannelKey;
use crate::subscription::StreamTarget;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Unique identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubscriptionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Diagnostic view of a registered subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    /// Subscription identifier
    pub id: SubscriptionId,
    /// What the client attached to
    pub target: StreamTarget,
    /// Channels the subscription merges
    pub channels: Vec<ChannelKey>,
    /// Attach time
    pub created_at: DateTime<Utc>,
    /// False once a stop has been requested
    pub alive: bool,
}

struct Registered {
    target: StreamTarget,
    channels: Vec<ChannelKey>,
    created_at: DateTime<Utc>,
    token: CancellationToken,
}

impl Registered {
    fn info(&self, id: SubscriptionId) -> SubscriptionInfo {
        SubscriptionInfo {
            id,
            target: self.target.clone(),
            channels: self.channels.clone(),
            created_at: self.created_at,
            alive: !self.token.is_cancelled(),
        }
    }
}

/// Concurrent table of live subscriptions.
///
/// No lock is held across an `.await`; every operation is a short map access.
pub struct RelayRegistry {
    subscriptions: DashMap<SubscriptionId, Registered>,
    root: CancellationToken,
}

impl RelayRegistry {
    /// Create a registry with its own root token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(CancellationToken::new())
    }

    /// Create a registry whose subscriptions are cancelled with `root`.
    #[must_use]
    pub fn with_root(root: CancellationToken) -> Self {
        Self {
            subscriptions: DashMap::new(),
            root,
        }
    }

    /// Whether the root token has been cancelled (shutdown in progress).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Register a subscription and hand back its cancellation token.
    pub fn register(
        &self,
        id: SubscriptionId,
        target: StreamTarget,
        channels: Vec<ChannelKey>,
    ) -> CancellationToken {
        let token = self.root.child_token();
        self.subscriptions.insert(
            id,
            Registered {
                target: target.clone(),
                channels,
                created_at: Utc::now(),
                token: token.clone(),
            },
        );
        info!(subscription_id = %id, target = %target, "Subscription registered");
        token
    }

    /// Request a subscription to stop.
    ///
    /// Idempotent: stopping an unknown or already-stopped id is a no-op.
    /// Returns whether a live subscription was flipped to stopped.
    pub fn stop(&self, id: &SubscriptionId) -> bool {
        let Some(entry) = self.subscriptions.get(id) else {
            debug!(subscription_id = %id, "Stop requested for unknown subscription");
            return false;
        };
        if entry.token.is_cancelled() {
            return false;
        }
        entry.token.cancel();
        info!(subscription_id = %id, "Subscription stop requested");
        true
    }

    /// Stop every registered subscription. Returns how many were live.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for entry in self.subscriptions.iter() {
            if !entry.token.is_cancelled() {
                entry.token.cancel();
                stopped += 1;
            }
        }
        stopped
    }

    /// Remove a subscription. Called by the subscription itself on exit.
    pub fn unregister(&self, id: &SubscriptionId) -> bool {
        let removed = self.subscriptions.remove(id).is_some();
        if removed {
            info!(subscription_id = %id, "Subscription unregistered");
        }
        removed
    }

    /// Whether `id` is registered and not stopped.
    #[must_use]
    pub fn is_alive(&self, id: &SubscriptionId) -> bool {
        self.subscriptions
            .get(id)
            .is_some_and(|entry| !entry.token.is_cancelled())
    }

    /// Whether `id` is still registered (possibly draining).
    #[must_use]
    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Diagnostic view of one subscription.
    #[must_use]
    pub fn get(&self, id: &SubscriptionId) -> Option<SubscriptionInfo> {
        self.subscriptions.get(id).map(|entry| entry.info(*id))
    }

    /// Diagnostic view of every subscription, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        let mut all: Vec<SubscriptionInfo> = self
            .subscriptions
            .iter()
            .map(|entry| entry.value().info(*entry.key()))
            .collect();
        all.sort_by_key(|info| info.created_at);
        all
    }
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}
