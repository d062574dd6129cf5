//! Concurrent registry of the latest metrics per stream.
//!
//! Entries are stored behind `Arc` and replaced whole on every write, so a
//! reader sees either the previous record or the merged one, never a mix.
//! Every write is also published on a broadcast channel for live subscribers.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};

use crate::config::defaults::DEFAULT_METRICS_BROADCAST_CAPACITY;
use crate::models::{MetricsState, MetricsUpdate};

/// Change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricsEvent {
    Updated {
        stream_id: String,
        metrics: MetricsState,
    },
    Reset {
        stream_id: String,
    },
}

impl MetricsEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            MetricsEvent::Updated { stream_id, .. } | MetricsEvent::Reset { stream_id } => stream_id,
        }
    }
}

#[derive(Clone)]
pub struct MetricsStore {
    entries: Arc<RwLock<HashMap<String, Arc<MetricsState>>>>,
    events_tx: broadcast::Sender<MetricsEvent>,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_METRICS_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(broadcast_capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
        }
    }

    /// Merge `update` into the stream's record, creating a zeroed one first if absent
    pub async fn update_metrics(&self, stream_id: &str, update: MetricsUpdate) {
        let merged = {
            let mut entries = self.entries.write().await;
            let now = Utc::now();
            let merged = match entries.get(stream_id) {
                Some(existing) => update.merge_into(existing, now),
                None => update.merge_into(&MetricsState::zeroed(now), now),
            };
            entries.insert(stream_id.to_string(), Arc::new(merged.clone()));
            merged
        };

        trace!(
            "stream_id={} bitrate_kbps={} bandwidth_kbps={} latency_ms={}",
            stream_id, merged.bitrate_kbps, merged.bandwidth_kbps, merged.latency_ms
        );

        // No subscribers is fine
        let _ = self.events_tx.send(MetricsEvent::Updated {
            stream_id: stream_id.to_string(),
            metrics: merged,
        });
    }

    /// Latest record, or `None` for a stream that never reported or was reset
    pub async fn get_metrics(&self, stream_id: &str) -> Option<MetricsState> {
        self.entries
            .read()
            .await
            .get(stream_id)
            .map(|state| state.as_ref().clone())
    }

    /// Remove the stream's record entirely
    pub async fn reset_metrics(&self, stream_id: &str) {
        let removed = self.entries.write().await.remove(stream_id).is_some();
        if removed {
            debug!("stream_id={} metrics reset", stream_id);
            let _ = self.events_tx.send(MetricsEvent::Reset {
                stream_id: stream_id.to_string(),
            });
        }
    }

    /// Most recently updated record, or a zeroed one when nothing is live
    pub async fn current_metrics(&self) -> MetricsState {
        self.entries
            .read()
            .await
            .values()
            .max_by_key(|state| state.last_updated)
            .map(|state| state.as_ref().clone())
            .unwrap_or_else(|| MetricsState::zeroed(Utc::now()))
    }

    /// Copy of every entry
    pub async fn snapshot(&self) -> HashMap<String, MetricsState> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(id, state)| (id.clone(), state.as_ref().clone()))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricsEvent> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn bitrate(kbps: u64) -> MetricsUpdate {
        MetricsUpdate {
            bitrate_kbps: Some(kbps),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_never_creates_entries() {
        let store = MetricsStore::new();
        assert!(store.get_metrics("missing").await.is_none());
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_is_a_merge() {
        let store = MetricsStore::new();
        store
            .update_metrics(
                "s1",
                MetricsUpdate {
                    bitrate_kbps: Some(8),
                    bandwidth_kbps: Some(9.6),
                    latency_ms: Some(1000),
                },
            )
            .await;
        store.update_metrics("s1", bitrate(16)).await;

        let state = store.get_metrics("s1").await.unwrap();
        assert_eq!(state.bitrate_kbps, 16);
        assert_eq!(state.latency_ms, 1000);
        assert_eq!(state.bandwidth_kbps, 9.6);
    }

    #[tokio::test]
    async fn test_first_update_starts_from_zero() {
        let store = MetricsStore::new();
        store.update_metrics("s1", bitrate(5)).await;
        let state = store.get_metrics("s1").await.unwrap();
        assert_eq!(state.latency_ms, 0);
        assert_eq!(state.bandwidth_kbps, 0.0);
    }

    #[tokio::test]
    async fn test_reset_removes_rather_than_zeroes() {
        let store = MetricsStore::new();
        store.update_metrics("s1", bitrate(0)).await;
        assert!(store.get_metrics("s1").await.is_some());

        store.reset_metrics("s1").await;
        assert!(store.get_metrics("s1").await.is_none());

        // Resetting again is harmless
        store.reset_metrics("s1").await;
    }

    #[tokio::test]
    async fn test_post_reset_update_is_newer() {
        let store = MetricsStore::new();
        store.update_metrics("s1", bitrate(8)).await;
        let before = store.get_metrics("s1").await.unwrap().last_updated;

        store.reset_metrics("s1").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.update_metrics("s1", bitrate(9)).await;

        let after = store.get_metrics("s1").await.unwrap();
        assert!(after.last_updated > before);
        assert_eq!(after.latency_ms, 0);
    }

    #[tokio::test]
    async fn test_streams_are_independent() {
        let store = MetricsStore::new();
        store.update_metrics("a", bitrate(1)).await;
        store.update_metrics("b", bitrate(2)).await;
        store.reset_metrics("a").await;

        assert!(store.get_metrics("a").await.is_none());
        assert_eq!(store.get_metrics("b").await.unwrap().bitrate_kbps, 2);
    }

    #[tokio::test]
    async fn test_current_metrics_picks_latest_or_zero() {
        let store = MetricsStore::new();
        assert_eq!(store.current_metrics().await.bitrate_kbps, 0);

        store.update_metrics("a", bitrate(1)).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.update_metrics("b", bitrate(2)).await;
        assert_eq!(store.current_metrics().await.bitrate_kbps, 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates_and_resets() {
        let store = MetricsStore::new();
        let mut rx = store.subscribe();

        store.update_metrics("s1", bitrate(8)).await;
        store.reset_metrics("s1").await;
        store.reset_metrics("never-existed").await;

        match rx.recv().await.unwrap() {
            MetricsEvent::Updated { stream_id, metrics } => {
                assert_eq!(stream_id, "s1");
                assert_eq!(metrics.bitrate_kbps, 8);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            rx.recv().await.unwrap(),
            MetricsEvent::Reset {
                stream_id: "s1".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_readers() {
        let store = MetricsStore::new();
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("stream-{}", i);
                for kbps in 0..50 {
                    store
                        .update_metrics(
                            &id,
                            MetricsUpdate {
                                bitrate_kbps: Some(kbps),
                                bandwidth_kbps: Some(kbps as f64 * 1.2),
                                latency_ms: Some(kbps),
                            },
                        )
                        .await;
                    if let Some(state) = store.get_metrics(&id).await {
                        // A reader never sees fields from different writes
                        assert_eq!(state.bitrate_kbps, state.latency_ms);
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.snapshot().await.len(), 8);
    }
}
