//! Domain types shared across the coordinator, decision engine, and transformer.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where an ad break's activation originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakSource {
    Scte35,
    Manual,
    Scheduled,
}

/// Which delivery mode was actually served for a given break event — pinned
/// per `event_id` so variant requests never silently swap mid-break (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedMode {
    Sgai,
    Ssai,
}

/// SCTE-35 timing/authorization carried by a break, when the trigger was a cue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scte35Context {
    pub pdt: Option<DateTime<FixedOffset>>,
    pub signal_type: String,
    pub event_id: u32,
}

/// Zero-or-one-per-channel active ad break (§3 AdBreakState).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdBreakState {
    pub channel_id: String,
    pub event_id: String,
    pub source: BreakSource,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    pub duration_s: f32,
    pub decision: AdDecision,
    pub created_at: DateTime<FixedOffset>,
    pub scte35: Option<Scte35Context>,
}

/// A resolved ad item: one creative and its per-bitrate variant playlists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdItem {
    pub ad_id: String,
    pub duration_s: f32,
    /// bitrate (kbps) -> variant playlist URL
    pub variants: BTreeMap<u32, String>,
}

impl AdItem {
    /// Resolve the nearest available bitrate: exact match, else next-higher,
    /// else next-lower (§4.2.2 bitrate selection rule).
    pub fn variant_for_bitrate(&self, bitrate_kbps: u32) -> Option<&str> {
        if let Some(uri) = self.variants.get(&bitrate_kbps) {
            return Some(uri.as_str());
        }
        self.variants
            .range(bitrate_kbps..)
            .next()
            .or_else(|| self.variants.range(..bitrate_kbps).next_back())
            .map(|(_, uri)| uri.as_str())
    }
}

/// Result of the ad-decision waterfall (§4.5): an ordered ad pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdDecision {
    pub pod_id: String,
    pub items: Vec<AdItem>,
    /// Multivariant playlist URL for the whole pod, used as SGAI's
    /// `X-ASSET-URI`. `None` degrades to the first item's own variant.
    pub multivariant_url: Option<String>,
}

impl AdDecision {
    pub fn empty(pod_id: impl Into<String>) -> Self {
        Self {
            pod_id: pod_id.into(),
            items: Vec::new(),
            multivariant_url: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_duration_s(&self) -> f32 {
        self.items.iter().map(|i| i.duration_s).sum()
    }

    /// URL to present as the SGAI interstitial asset. Falls back to the
    /// highest-bitrate variant of the first item when no pod-level
    /// multivariant playlist is configured.
    pub fn interstitial_uri(&self) -> Option<&str> {
        if let Some(ref uri) = self.multivariant_url {
            return Some(uri.as_str());
        }
        self.items
            .first()
            .and_then(|item| item.variants.values().next_back())
            .map(|s| s.as_str())
    }
}

/// A decoded SCTE-35 cue (§3, §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub event_id: u32,
    pub command_type: CueCommandType,
    pub pdt: Option<DateTime<FixedOffset>>,
    pub duration_s: Option<f32>,
    pub tier: u16,
    pub out_of_network_indicator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueCommandType {
    SpliceInsert,
    TimeSignal,
}
