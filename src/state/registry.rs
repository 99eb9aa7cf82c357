//! Slave Registry
//!
//! The master's view of which slaves are alive. Each identity maps to the
//! RFC 3339 timestamp of its last valid contact; a periodic sweep evicts
//! entries that are too old or unreadable.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

/// Default interval between sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default age after which a silent slave is evicted
pub const STALE_AFTER: Duration = Duration::from_secs(120);

/// Registry of known slaves and their last contact time
#[derive(Default)]
pub struct SlaveRegistry {
    slaves: Mutex<HashMap<String, String>>,
}

impl SlaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record contact from `identity` now
    pub async fn touch(&self, identity: &str) {
        self.touch_at(identity, Utc::now()).await;
    }

    /// Record contact from `identity` at a given instant
    pub async fn touch_at(&self, identity: &str, at: DateTime<Utc>) {
        let mut slaves = self.slaves.lock().await;
        slaves.insert(identity.to_string(), at.to_rfc3339());
    }

    /// Evict slaves silent for longer than `stale_after`
    pub async fn sweep(&self, stale_after: Duration) -> Vec<String> {
        self.sweep_at(Utc::now(), stale_after).await
    }

    /// Evict relative to `now`; returns the evicted identities
    pub async fn sweep_at(&self, now: DateTime<Utc>, stale_after: Duration) -> Vec<String> {
        // out-of-range ages never expire
        let threshold = chrono::Duration::from_std(stale_after).ok();
        let mut slaves = self.slaves.lock().await;
        let mut evicted = Vec::new();

        slaves.retain(|identity, last_seen| {
            match DateTime::parse_from_rfc3339(last_seen) {
                Ok(seen) if threshold.map_or(false, |t| now.signed_duration_since(seen) > t) => {
                    tracing::info!(slave = %identity, last_seen = %last_seen, "Removing inactive slave");
                    evicted.push(identity.clone());
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(slave = %identity, "Unreadable last-seen time {:?}: {}", last_seen, e);
                    evicted.push(identity.clone());
                    false
                }
            }
        });

        evicted
    }

    /// Point-in-time copy of identity -> last-seen timestamp
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        let slaves = self.slaves.lock().await;
        slaves.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Number of registered slaves
    pub async fn len(&self) -> usize {
        self.slaves.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run the sweep on a fixed interval until `shutdown` flips to true
    pub fn start_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        stale_after: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            while !*shutdown.borrow_and_update() {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = registry.sweep(stale_after).await;
                        if !evicted.is_empty() {
                            tracing::debug!("Sweep evicted {} slave(s)", evicted.len());
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, identity: &str, last_seen: &str) {
        self.slaves
            .lock()
            .await
            .insert(identity.to_string(), last_seen.to_string());
    }
}
