//! Stored-pod resolution: step 2 of the ad-decision waterfall (§4.5).
//!
//! The admin CRUD surface that lets operators bind pods/ads to a channel is
//! out of scope; this module only consumes the resulting bindings. The
//! in-memory store below is the dev/test stand-in a real deployment would
//! replace with a database-backed one, the same relationship
//! `kv::MemoryKv` has to `kv::ValkeyKv`.

use crate::types::AdItem;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named collection of `ad_id`s bound to a channel, in priority order.
#[derive(Debug, Clone)]
pub struct StoredPod {
    pub pod_id: String,
    pub ad_ids: Vec<String>,
}

#[async_trait]
pub trait PodStore: Send + Sync {
    /// Pods bound to `channel_id`, highest priority first.
    async fn bound_pods(&self, channel_id: &str) -> Vec<StoredPod>;
    /// Resolve a single `ad_id` to its transcoded variant ladder.
    async fn resolve_ad(&self, ad_id: &str) -> Option<AdItem>;
}

#[derive(Default)]
pub struct InMemoryPodStore {
    pods: DashMap<String, Vec<StoredPod>>,
    ads: DashMap<String, AdItem>,
}

impl InMemoryPodStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_pod(&self, channel_id: impl Into<String>, pod: StoredPod) {
        self.pods.entry(channel_id.into()).or_default().push(pod);
    }

    pub fn register_ad(&self, ad_id: impl Into<String>, duration_s: f32, variants: BTreeMap<u32, String>) {
        let ad_id = ad_id.into();
        self.ads.insert(
            ad_id.clone(),
            AdItem {
                ad_id,
                duration_s,
                variants,
            },
        );
    }
}

#[async_trait]
impl PodStore for InMemoryPodStore {
    async fn bound_pods(&self, channel_id: &str) -> Vec<StoredPod> {
        self.pods.get(channel_id).map(|v| v.clone()).unwrap_or_default()
    }

    async fn resolve_ad(&self, ad_id: &str) -> Option<AdItem> {
        self.ads.get(ad_id).map(|a| a.clone())
    }
}

/// Resolve every pod bound to `channel_id` to a full `AdDecision`, taking
/// the highest-priority pod whose every `ad_id` resolves. A pod with a
/// dangling `ad_id` is skipped, not partially served.
pub async fn resolve_stored_pod(
    store: &Arc<dyn PodStore>,
    channel_id: &str,
) -> Option<crate::types::AdDecision> {
    for pod in store.bound_pods(channel_id).await {
        let mut items = Vec::with_capacity(pod.ad_ids.len());
        let mut complete = true;
        for ad_id in &pod.ad_ids {
            match store.resolve_ad(ad_id).await {
                Some(item) => items.push(item),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete && !items.is_empty() {
            return Some(crate::types::AdDecision {
                pod_id: pod.pod_id,
                items,
                multivariant_url: None,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(url: &str) -> BTreeMap<u32, String> {
        let mut m = BTreeMap::new();
        m.insert(1000, url.to_string());
        m
    }

    #[tokio::test]
    async fn resolves_first_complete_pod() {
        let store = InMemoryPodStore::new();
        store.register_ad("ad-1", 15.0, variants("https://ads.example.com/ad1.m3u8"));
        store.register_ad("ad-2", 15.0, variants("https://ads.example.com/ad2.m3u8"));
        store.bind_pod(
            "chan-1",
            StoredPod {
                pod_id: "pod-a".to_string(),
                ad_ids: vec!["ad-1".to_string(), "ad-2".to_string()],
            },
        );

        let store: Arc<dyn PodStore> = Arc::new(store);
        let decision = resolve_stored_pod(&store, "chan-1").await.unwrap();
        assert_eq!(decision.pod_id, "pod-a");
        assert_eq!(decision.items.len(), 2);
    }

    #[tokio::test]
    async fn skips_pod_with_dangling_ad_id() {
        let store = InMemoryPodStore::new();
        store.register_ad("ad-1", 15.0, variants("https://ads.example.com/ad1.m3u8"));
        store.bind_pod(
            "chan-1",
            StoredPod {
                pod_id: "pod-broken".to_string(),
                ad_ids: vec!["ad-1".to_string(), "ad-missing".to_string()],
            },
        );
        store.bind_pod(
            "chan-1",
            StoredPod {
                pod_id: "pod-ok".to_string(),
                ad_ids: vec!["ad-1".to_string()],
            },
        );

        let store: Arc<dyn PodStore> = Arc::new(store);
        let decision = resolve_stored_pod(&store, "chan-1").await.unwrap();
        assert_eq!(decision.pod_id, "pod-ok");
    }

    #[tokio::test]
    async fn no_bound_pods_returns_none() {
        let store: Arc<dyn PodStore> = Arc::new(InMemoryPodStore::new());
        assert!(resolve_stored_pod(&store, "chan-unknown").await.is_none());
    }
}
