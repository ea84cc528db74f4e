//! In-process relay used by the test suite and demos. Behaves like the hosted
//! store at the interface boundary: full-snapshot subscriptions, subtree
//! deletes, on-disconnect cleanup triggers per client.

use crate::signaling::relay::{RelaySnapshot, RelaySubscription, SignalingRelay};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use trellis_core::error::SignalingError;

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<RelaySnapshot>,
}

struct Store {
    entries: DashMap<String, Value>,
    watchers: Mutex<Vec<Watcher>>,
    push_seq: AtomicU64,
}

impl Store {
    fn snapshot_under(&self, prefix: &str) -> RelaySnapshot {
        let lead = format!("{prefix}/");
        let mut snap = BTreeMap::new();
        for entry in self.entries.iter() {
            if let Some(rel) = entry.key().strip_prefix(&lead) {
                snap.insert(rel.to_string(), entry.value().clone());
            }
        }
        snap
    }

    fn notify(&self, changed: &str) {
        let mut watchers = self.watchers.lock().unwrap_or_else(|e| e.into_inner());
        watchers.retain(|w| {
            let relevant =
                changed.starts_with(&format!("{}/", w.prefix)) || changed == w.prefix;
            if !relevant {
                return !w.tx.is_closed();
            }
            w.tx.send(self.snapshot_under(&w.prefix)).is_ok()
        });
    }

    fn delete_subtree(&self, path: &str) {
        let lead = format!("{path}/");
        self.entries
            .retain(|key, _| key != path && !key.starts_with(&lead));
        self.notify(path);
    }
}

#[derive(Clone)]
pub struct InMemoryRelay {
    store: Arc<Store>,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Store {
                entries: DashMap::new(),
                watchers: Mutex::new(Vec::new()),
                push_seq: AtomicU64::new(0),
            }),
        }
    }

    /// A client handle with its own on-disconnect registrations.
    pub fn client(&self) -> InMemoryRelayClient {
        InMemoryRelayClient {
            store: self.store.clone(),
            on_disconnect: Mutex::new(Vec::new()),
            severed: AtomicBool::new(false),
        }
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.store.entries.get(path).map(|v| v.clone())
    }

    pub fn entry_count(&self, prefix: &str) -> usize {
        self.store.snapshot_under(prefix).len()
    }
}

impl Default for InMemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryRelayClient {
    store: Arc<Store>,
    on_disconnect: Mutex<Vec<String>>,
    severed: AtomicBool,
}

impl InMemoryRelayClient {
    /// Simulate an ungraceful disconnect: run the registered cleanup triggers
    /// and refuse further operations.
    pub fn sever(&self) {
        if self.severed.swap(true, Ordering::SeqCst) {
            return;
        }
        let paths = std::mem::take(
            &mut *self.on_disconnect.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for path in paths {
            self.store.delete_subtree(&path);
        }
    }

    fn check_live(&self) -> Result<(), SignalingError> {
        if self.severed.load(Ordering::SeqCst) {
            Err(SignalingError::Disconnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SignalingRelay for InMemoryRelayClient {
    async fn put(&self, path: &str, value: Value) -> Result<(), SignalingError> {
        self.check_live()?;
        self.store.entries.insert(path.to_string(), value);
        self.store.notify(path);
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, SignalingError> {
        self.check_live()?;
        let seq = self.store.push_seq.fetch_add(1, Ordering::SeqCst);
        let full = format!("{path}/{seq:016x}");
        self.store.entries.insert(full.clone(), value);
        self.store.notify(&full);
        Ok(full)
    }

    async fn delete(&self, path: &str) -> Result<(), SignalingError> {
        self.check_live()?;
        self.store.delete_subtree(path);
        Ok(())
    }

    async fn subscribe(&self, prefix: &str) -> Result<RelaySubscription, SignalingError> {
        self.check_live()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.store.snapshot_under(prefix));
        self.store
            .watchers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Watcher {
                prefix: prefix.to_string(),
                tx,
            });
        Ok(RelaySubscription { rx })
    }

    async fn on_disconnect_delete(&self, path: &str) -> Result<(), SignalingError> {
        self.check_live()?;
        self.on_disconnect
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_string());
        Ok(())
    }
}
