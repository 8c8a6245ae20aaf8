//! Ad-decision waterfall (§4.5): VAST → stored pod → slate → empty. Returns
//! the first step that produces a usable `AdDecision`; each step's failure
//! is a fall-through, never a surfaced error.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use crate::ad::pod::{resolve_stored_pod, PodStore};
use crate::ad::vast::{self, VastAdType};
use crate::config::ChannelConfig;
use crate::kv::Kv;
use crate::metrics;
use crate::types::AdDecision;

const MAX_WRAPPER_DEPTH: u32 = 5;

/// Ad-decision waterfall. Holds the collaborators each step needs; the
/// coordinator calls `resolve` once per new ad break and memoizes the
/// result in `cache` keyed by `(channel_id, event_id)` (§4.5, §6).
pub struct DecisionEngine {
    http_client: Client,
    pod_store: Arc<dyn PodStore>,
    cache: Arc<dyn Kv>,
}

impl DecisionEngine {
    pub fn new(http_client: Client, pod_store: Arc<dyn PodStore>, cache: Arc<dyn Kv>) -> Self {
        Self {
            http_client,
            pod_store,
            cache,
        }
    }

    fn cache_key(channel_id: &str, event_id: &str) -> String {
        format!("adbreak:{channel_id}:{event_id}")
    }

    /// Resolve an `AdDecision` for `event_id`, consulting memoized results
    /// first. `duration_s` is the requested break duration (used for the
    /// VAST `[DURATION]` macro and as the slate/empty fallback's nominal
    /// length); the channel's bitrate ladder drives variant selection.
    pub async fn resolve(
        &self,
        channel: &ChannelConfig,
        event_id: &str,
        duration_s: f32,
    ) -> AdDecision {
        let cache_key = Self::cache_key(&channel.channel_id, event_id);
        if let Ok(Some(cached)) = self.cache.get(&cache_key).await {
            if let Ok(decision) = serde_json::from_str::<AdDecision>(&cached) {
                return decision;
            }
        }

        let decision = self.resolve_uncached(channel, event_id, duration_s).await;

        if let Ok(serialized) = serde_json::to_string(&decision) {
            let ttl = Duration::from_secs_f32((duration_s + 60.0).max(1.0));
            let _ = self.cache.set(&cache_key, serialized, ttl).await;
        }

        decision
    }

    async fn resolve_uncached(
        &self,
        channel: &ChannelConfig,
        event_id: &str,
        duration_s: f32,
    ) -> AdDecision {
        if channel.vast_enabled {
            if let Some(ref vast_url) = channel.vast_url {
                match self.fetch_vast(vast_url, channel, event_id, duration_s).await {
                    Some(decision) if !decision.is_empty() => {
                        metrics::record_vast_request("success");
                        return decision;
                    }
                    Some(_) => metrics::record_vast_request("empty"),
                    None => metrics::record_vast_request("error"),
                }
            }
        }

        if let Some(decision) = resolve_stored_pod(&self.pod_store, &channel.channel_id).await {
            return decision;
        }

        if let Some(decision) = crate::ad::slate::resolve_for_channel(channel, event_id) {
            metrics::record_slate_fallback();
            return decision;
        }

        AdDecision::empty(format!("empty-{event_id}"))
    }

    /// Fetch and parse VAST, following wrapper chains up to
    /// `MAX_WRAPPER_DEPTH`, bounded by `channel.vast_timeout_ms` overall.
    async fn fetch_vast(
        &self,
        vast_url: &str,
        channel: &ChannelConfig,
        event_id: &str,
        duration_s: f32,
    ) -> Option<AdDecision> {
        let budget = Duration::from_millis(channel.vast_timeout_ms);
        let resolved_url = vast_url
            .replace("[DURATION]", &format!("{}", duration_s as u32))
            .replace("[CACHEBUSTING]", event_id);

        match tokio::time::timeout(budget, self.fetch_vast_chain(resolved_url, 0)).await {
            Ok(Some(media_files)) if !media_files.is_empty() => {
                let variants =
                    vast::select_media_files_for_ladder(&media_files, &channel.bitrate_ladder);
                if variants.is_empty() {
                    return None;
                }
                Some(AdDecision {
                    pod_id: format!("vast-{event_id}"),
                    items: vec![crate::types::AdItem {
                        ad_id: event_id.to_string(),
                        duration_s,
                        variants,
                    }],
                    multivariant_url: None,
                })
            }
            Ok(Some(_)) => None,
            Ok(None) => None,
            Err(_) => {
                warn!("VAST fetch exceeded {:?} budget for event {event_id}", budget);
                None
            }
        }
    }

    fn fetch_vast_chain<'a>(
        &'a self,
        url: String,
        depth: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<Vec<vast::MediaFile>>> + Send + 'a>>
    {
        Box::pin(async move {
            if depth > MAX_WRAPPER_DEPTH {
                warn!("VAST wrapper chain exceeded max depth ({MAX_WRAPPER_DEPTH})");
                return None;
            }

            let xml = match self.http_client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await.ok()?,
                Ok(resp) => {
                    warn!("VAST endpoint returned status {}", resp.status());
                    return None;
                }
                Err(e) => {
                    warn!("VAST request failed: {e}");
                    return None;
                }
            };

            let response = match vast::parse_vast(&xml) {
                Ok(r) => r,
                Err(e) => {
                    warn!("failed to parse VAST XML: {e}");
                    return None;
                }
            };

            let mut media_files = Vec::new();
            for ad in &response.ads {
                match &ad.ad_type {
                    VastAdType::InLine(inline) => {
                        for creative in &inline.creatives {
                            if let Some(ref linear) = creative.linear {
                                media_files.extend(linear.media_files.iter().cloned());
                            }
                        }
                    }
                    VastAdType::Wrapper(wrapper) => {
                        if let Some(mut wrapped) =
                            self.fetch_vast_chain(wrapper.ad_tag_uri.clone(), depth + 1).await
                        {
                            media_files.append(&mut wrapped);
                        }
                    }
                }
            }

            info!("resolved {} VAST media file(s) at depth {depth}", media_files.len());
            Some(media_files)
        })
    }
}
