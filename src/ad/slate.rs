//! Slate: step 3 of the ad-decision waterfall (§4.5). The channel's slate
//! (or the org default) is wrapped as a one-item `AdDecision` carrying the
//! slate's own duration — it does not try to fill the requested break
//! duration, since a slate loops client-side.

use crate::config::ChannelConfig;
use crate::types::{AdDecision, AdItem};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct SlateProvider {
    base_url: String,
    duration_s: f32,
}

impl SlateProvider {
    pub fn new(base_url: impl Into<String>, duration_s: f32) -> Self {
        Self {
            base_url: base_url.into(),
            duration_s,
        }
    }

    /// Pure lookup function (§9 Design Notes: "represent slate resolution
    /// as a pure function; do not hold back-pointers"). A channel's own
    /// slate wins; otherwise fall back to the organization default.
    pub fn resolve_slate_id<'a>(
        channel_slate_id: Option<&'a str>,
        org_default_slate_id: Option<&'a str>,
    ) -> Option<&'a str> {
        channel_slate_id.or(org_default_slate_id)
    }

    /// Build the one-item `AdDecision` for this slate, with a variant per
    /// bitrate in `ladder`.
    pub fn decision(&self, pod_id: impl Into<String>, ladder: &[u32]) -> AdDecision {
        let mut variants = BTreeMap::new();
        for &bitrate in ladder {
            variants.insert(bitrate, format!("{}/{}k/master.m3u8", self.base_url, bitrate));
        }

        AdDecision {
            pod_id: pod_id.into(),
            items: vec![AdItem {
                ad_id: "slate".to_string(),
                duration_s: self.duration_s,
                variants,
            }],
            multivariant_url: Some(format!("{}/master.m3u8", self.base_url)),
        }
    }
}

/// Build the slate step of the ad-decision waterfall for `channel`, `None`
/// when the channel has no slate configured (no `ad_pod_base_url`, or
/// neither the channel nor the org has a `slate_id`) — the caller falls
/// through to `empty` in that case (§4.5). Shared by `DecisionEngine`'s
/// waterfall and the viewer's `NoMatchingVariant` retry (§9 "represent
/// slate resolution as a pure function").
pub fn resolve_for_channel(channel: &ChannelConfig, event_id: &str) -> Option<AdDecision> {
    let base_url = channel.ad_pod_base_url.as_deref()?;
    let slate_id = SlateProvider::resolve_slate_id(channel.slate_id.as_deref(), None)?;
    let slate = SlateProvider::new(base_url, channel.default_ad_duration_s as f32);
    Some(slate.decision(format!("slate-{slate_id}-{event_id}"), &channel.bitrate_ladder))
}
