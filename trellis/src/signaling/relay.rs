use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use trellis_core::error::SignalingError;

/// Everything currently stored under a subscribed prefix, keyed by the path
/// relative to that prefix. Subscriptions deliver the full snapshot on every
/// change, not diffs; consumers must stay idempotent against redelivery.
pub type RelaySnapshot = BTreeMap<String, Value>;

pub struct RelaySubscription {
    pub rx: mpsc::UnboundedReceiver<RelaySnapshot>,
}

/// The external pub/sub store the signaling rides on: a tree of JSON values
/// addressed by slash-separated paths, with live snapshot subscriptions.
///
/// One instance represents one client's link to the store. `delete` removes a
/// whole subtree, so `delete("rooms/r/offers/alice")` clears alice's outbox.
#[async_trait]
pub trait SignalingRelay: Send + Sync {
    async fn put(&self, path: &str, value: Value) -> Result<(), SignalingError>;

    /// Store `value` under a relay-generated, insertion-ordered child key of
    /// `path` and return the full path of the new entry.
    async fn push(&self, path: &str, value: Value) -> Result<String, SignalingError>;

    /// Remove the subtree rooted at `path`. Idempotent.
    async fn delete(&self, path: &str) -> Result<(), SignalingError>;

    /// Subscribe to everything under `prefix`. The current snapshot is
    /// delivered immediately, then again after every write or delete that
    /// touches the subtree. Dropping the receiver unsubscribes.
    async fn subscribe(&self, prefix: &str) -> Result<RelaySubscription, SignalingError>;

    /// Register a server-side trigger deleting `path` if this client vanishes
    /// without a graceful leave (crash, tab close, network loss).
    async fn on_disconnect_delete(&self, path: &str) -> Result<(), SignalingError>;
}
