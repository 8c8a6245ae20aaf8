//! SCTE-35 Monitor (§4.9): a background per-channel poller that fetches the
//! channel's origin media playlist, extracts and decodes embedded SCTE-35
//! cues, and forwards the valid ones to the Channel Coordinator.
//!
//! The loop is stateless beyond its own ticking; deduplication and
//! authorization filtering are entirely the coordinator's job
//! (`Coordinator::scte35_cue`). Polling interval is
//! `max(manifest_cache_max_age_s, target_duration/2)` so the monitor never
//! polls faster than the channel's own manifest freshness budget.

use std::sync::Arc;
use std::time::Duration;

use m3u8_rs::Playlist;
use reqwest::Client;
use tracing::{debug, warn};

use crate::channel_config::ChannelConfigCache;
use crate::config::ChannelConfig;
use crate::coordinator::Coordinator;
use crate::hls::parser::parse_hls_playlist;
use crate::hls::scte35_tags::extract_raw_cues;
use crate::scte35::decode_cue;

pub struct Scte35Monitor {
    http_client: Client,
    config_cache: Arc<ChannelConfigCache>,
    coordinator: Arc<Coordinator>,
}

impl Scte35Monitor {
    pub fn new(
        http_client: Client,
        config_cache: Arc<ChannelConfigCache>,
        coordinator: Arc<Coordinator>,
    ) -> Self {
        Self {
            http_client,
            config_cache,
            coordinator,
        }
    }

    /// Spawn the polling loop for one channel onto its own task, so a
    /// slow or broken origin never delays another channel's cues.
    pub fn spawn(self: &Arc<Self>, channel_id: String) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            monitor.run(channel_id).await;
        });
    }

    async fn run(&self, channel_id: String) {
        loop {
            let channel = match self.config_cache.get_by_id(&channel_id).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("scte35 monitor: config lookup failed for {channel_id}: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            if !channel.scte35_enabled {
                tokio::time::sleep(Duration::from_secs(
                    channel.manifest_cache_max_age_s as u64,
                ))
                .await;
                continue;
            }

            let interval = self.poll_one(&channel).await;
            tokio::time::sleep(interval).await;
        }
    }

    /// Fetch, decode, and forward cues once. Returns the interval to wait
    /// before the next poll; every failure path falls back to
    /// `manifest_cache_max_age_s` rather than hammering a broken origin.
    async fn poll_one(&self, channel: &ChannelConfig) -> Duration {
        let base_interval = Duration::from_secs(channel.manifest_cache_max_age_s as u64);

        let body = match self.http_client.get(&channel.origin_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        "scte35 monitor: failed reading body for {}: {e}",
                        channel.channel_id
                    );
                    return base_interval;
                }
            },
            Ok(resp) => {
                warn!(
                    "scte35 monitor: origin returned {} for {}",
                    resp.status(),
                    channel.channel_id
                );
                return base_interval;
            }
            Err(e) => {
                warn!(
                    "scte35 monitor: origin fetch failed for {}: {e}",
                    channel.channel_id
                );
                return base_interval;
            }
        };

        let playlist = match parse_hls_playlist(&body) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "scte35 monitor: malformed playlist for {}: {e}",
                    channel.channel_id
                );
                return base_interval;
            }
        };

        let media = match playlist {
            Playlist::MediaPlaylist(m) => m,
            Playlist::MasterPlaylist(_) => {
                debug!(
                    "scte35 monitor: {} origin_url resolves to a master playlist, nothing to scan",
                    channel.channel_id
                );
                return base_interval;
            }
        };

        let interval = base_interval.max(Duration::from_secs_f32(
            (media.target_duration / 2.0).max(1.0),
        ));

        for raw in extract_raw_cues(&media) {
            match decode_cue(&raw.payload, raw.pdt) {
                Ok(Some(cue)) => {
                    if let Err(e) = self.coordinator.scte35_cue(channel, &cue).await {
                        warn!(
                            "scte35 monitor: coordinator rejected cue for {}: {e}",
                            channel.channel_id
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "scte35 monitor: cue decode failed for {}: {e}",
                        channel.channel_id
                    );
                }
            }
        }

        interval
    }
}
