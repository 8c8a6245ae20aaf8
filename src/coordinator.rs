//! Channel Coordinator (§4.6): the per-channel single-writer actor that
//! owns `AdBreakState`, the version counter, the SCTE-35 dedup set, and the
//! per-event served-mode pins. Every state mutation is serialised on a
//! per-channel `tokio::sync::Mutex`; durable storage is written before the
//! lock releases (write-through).
//!
//! Per §9 Design Notes, the coordinator is never a process-global
//! singleton: actors are addressed by `channel_id` through the pluggable
//! `ActorStore` trait. `InProcessActorStore` is the in-process placement
//! this crate ships; a distributed placement is a deployment concern.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::ad::DecisionEngine;
use crate::config::ChannelConfig;
use crate::error::{GatewayError, Result};
use crate::kv::Kv;
use crate::metrics;
use crate::types::{AdBreakState, BreakSource, Cue, Scte35Context, ServedMode};

const DEDUP_CAPACITY: usize = 256;
const WRITE_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Bounded LRU of recently-seen `event_id`s, drop-oldest (§3 Dedup set).
#[derive(Debug, Default, Clone)]
struct DedupSet {
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl DedupSet {
    fn from_order(order: Vec<String>) -> Self {
        let members = order.iter().cloned().collect();
        Self {
            order: order.into(),
            members,
        }
    }

    fn contains(&self, event_id: &str) -> bool {
        self.members.contains(event_id)
    }

    fn insert(&mut self, event_id: String) {
        if self.members.contains(&event_id) {
            return;
        }
        if self.order.len() >= DEDUP_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(event_id.clone());
        self.members.insert(event_id);
    }
}

/// In-memory actor state, mutated only while holding `ChannelActor::inner`.
struct ActorState {
    active_break: Option<AdBreakState>,
    version: u64,
    dedup: DedupSet,
    last_served_mode: HashMap<String, ServedMode>,
    hydrated: bool,
}

impl Default for ActorState {
    fn default() -> Self {
        Self {
            active_break: None,
            version: 0,
            dedup: DedupSet::default(),
            last_served_mode: HashMap::new(),
            hydrated: false,
        }
    }
}

/// Durable per-channel record (§6: `{active_break?, version, dedup_set[],
/// last_served_modes{}}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    active_break: Option<AdBreakState>,
    version: u64,
    dedup_set: Vec<String>,
    last_served_modes: HashMap<String, ServedMode>,
}

pub struct ChannelActor {
    inner: Mutex<ActorState>,
}

impl Default for ChannelActor {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ActorState::default()),
        }
    }
}

/// Pluggable placement for per-channel actors (§9: "must not be a
/// process-global singleton").
pub trait ActorStore: Send + Sync {
    fn get_or_create(&self, channel_id: &str) -> Arc<ChannelActor>;
    fn active_count(&self) -> usize;
}

#[derive(Default)]
pub struct InProcessActorStore {
    table: DashMap<String, Arc<ChannelActor>>,
}

impl InProcessActorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActorStore for InProcessActorStore {
    fn get_or_create(&self, channel_id: &str) -> Arc<ChannelActor> {
        self.table
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(ChannelActor::default()))
            .clone()
    }

    fn active_count(&self) -> usize {
        self.table.len()
    }
}

/// A consistent read-view of a channel's active break, including the
/// pinned serving mode for that break's `event_id`, if one has been
/// recorded yet (§4.6 read path).
#[derive(Debug, Clone)]
pub struct BreakView {
    pub state: AdBreakState,
    pub pinned_mode: Option<ServedMode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorSnapshot {
    pub channel_id: String,
    pub active_break: Option<AdBreakState>,
    pub version: u64,
}

fn state_key(channel_id: &str) -> String {
    format!("state:{channel_id}")
}

pub struct Coordinator {
    actors: Arc<dyn ActorStore>,
    durable: Arc<dyn Kv>,
    decisions: Arc<DecisionEngine>,
    kv_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        actors: Arc<dyn ActorStore>,
        durable: Arc<dyn Kv>,
        decisions: Arc<DecisionEngine>,
        kv_timeout: Duration,
    ) -> Self {
        Self {
            actors,
            durable,
            decisions,
            kv_timeout,
        }
    }

    pub fn active_channel_count(&self) -> usize {
        self.actors.active_count()
    }

    async fn lock_write<'a>(&self, actor: &'a ChannelActor) -> Result<tokio::sync::MutexGuard<'a, ActorState>> {
        match tokio::time::timeout(WRITE_LOCK_TIMEOUT, actor.inner.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::record_lock_timeout();
                Err(GatewayError::LockTimeout)
            }
        }
    }

    /// Load durable state into a freshly-created actor, once.
    async fn hydrate(&self, channel_id: &str, state: &mut ActorState) -> Result<()> {
        if state.hydrated {
            return Ok(());
        }
        state.hydrated = true;

        let loaded = tokio::time::timeout(self.kv_timeout, self.durable.get(&state_key(channel_id)))
            .await
            .map_err(|_| GatewayError::StorageFailure("durable read timed out".into()))??;

        if let Some(raw) = loaded {
            if let Ok(persisted) = serde_json::from_str::<PersistedState>(&raw) {
                state.active_break = persisted.active_break;
                state.version = persisted.version;
                state.dedup = DedupSet::from_order(persisted.dedup_set);
                state.last_served_mode = persisted.last_served_modes;
            }
        }
        Ok(())
    }

    async fn persist(&self, channel_id: &str, state: &ActorState) -> Result<()> {
        let persisted = PersistedState {
            active_break: state.active_break.clone(),
            version: state.version,
            dedup_set: state.dedup.order.iter().cloned().collect(),
            last_served_modes: state.last_served_mode.clone(),
        };
        let serialized = serde_json::to_string(&persisted)
            .map_err(|e| GatewayError::StorageFailure(format!("serialize durable state: {e}")))?;

        tokio::time::timeout(
            self.kv_timeout,
            self.durable
                .set(&state_key(channel_id), serialized, Duration::from_secs(3600)),
        )
        .await
        .map_err(|_| GatewayError::StorageFailure("durable write timed out".into()))?
    }

    /// Clear an active break whose grace window has elapsed. Called from
    /// every read/write entry point so expiry is observed without a
    /// separate sweeper task.
    fn expire_if_needed(state: &mut ActorState, grace_s: u32) -> bool {
        let Some(active) = &state.active_break else {
            return false;
        };
        let now = Utc::now().fixed_offset();
        if now >= active.end_time + chrono::Duration::seconds(grace_s as i64) {
            state.active_break = None;
            state.last_served_mode.clear();
            state.version += 1;
            true
        } else {
            false
        }
    }

    /// Read path (§4.6): a single atomic snapshot, no blocking writers out.
    pub async fn read(&self, channel: &ChannelConfig) -> Result<Option<BreakView>> {
        let actor = self.actors.get_or_create(&channel.channel_id);
        let mut guard = actor.inner.lock().await;
        self.hydrate(&channel.channel_id, &mut guard).await?;

        if Self::expire_if_needed(&mut guard, channel.grace_s) {
            self.persist(&channel.channel_id, &guard).await?;
        }

        Ok(guard.active_break.clone().map(|state| {
            let pinned = guard.last_served_mode.get(&state.event_id).copied();
            BreakView {
                state,
                pinned_mode: pinned,
            }
        }))
    }

    /// `/cue start` (§4.8, §4.6 Idle -> Active).
    pub async fn cue_start(
        &self,
        channel: &ChannelConfig,
        duration_s: Option<f32>,
        pod_id_hint: Option<String>,
        pod_url_hint: Option<String>,
    ) -> Result<AdBreakState> {
        let actor = self.actors.get_or_create(&channel.channel_id);
        let mut guard = self.lock_write(&actor).await?;
        self.hydrate(&channel.channel_id, &mut guard).await?;
        Self::expire_if_needed(&mut guard, channel.grace_s);

        let now = Utc::now().fixed_offset();
        if let Some(active) = &guard.active_break {
            if active.end_time > now {
                return Err(GatewayError::BadRequest(
                    "an ad break is already active for this channel".into(),
                ));
            }
        }

        let event_id = uuid::Uuid::new_v4().to_string();
        let duration_s = duration_s.unwrap_or(channel.default_ad_duration_s as f32);
        let mut decision = self.decisions.resolve(channel, &event_id, duration_s).await;
        if let Some(pod_id) = pod_id_hint {
            decision.pod_id = pod_id;
        }
        if let Some(pod_url) = pod_url_hint {
            decision.multivariant_url = Some(pod_url);
        }

        let state = AdBreakState {
            channel_id: channel.channel_id.clone(),
            event_id,
            source: BreakSource::Manual,
            start_time: now,
            end_time: now + chrono::Duration::milliseconds((duration_s * 1000.0) as i64),
            duration_s,
            decision,
            created_at: now,
            scte35: None,
        };

        guard.active_break = Some(state.clone());
        guard.last_served_mode.clear();
        guard.version += 1;
        self.persist(&channel.channel_id, &guard).await?;
        metrics::record_ad_break_started("manual");
        Ok(state)
    }

    /// `/cue stop` (§4.8, §4.6 Active -> Idle).
    pub async fn cue_stop(&self, channel_id: &str) -> Result<()> {
        let actor = self.actors.get_or_create(channel_id);
        let mut guard = self.lock_write(&actor).await?;
        self.hydrate(channel_id, &mut guard).await?;

        if guard.active_break.is_none() {
            return Err(GatewayError::BadRequest("no active break to stop".into()));
        }

        guard.active_break = None;
        guard.last_served_mode.clear();
        guard.version += 1;
        self.persist(channel_id, &guard).await
    }

    /// SCTE-35 cue arrival (§4.6 Idle -> Active / no-op on duplicate).
    /// Returns `None` when the cue is filtered, deduplicated, or collides
    /// with a still-active break.
    pub async fn scte35_cue(
        &self,
        channel: &ChannelConfig,
        cue: &Cue,
    ) -> Result<Option<AdBreakState>> {
        if !channel.scte35_enabled || !channel.scte35_auto_insert || !cue.out_of_network_indicator
        {
            metrics::record_scte35_cue("filtered");
            return Ok(None);
        }
        if channel.tier != 0 && cue.tier as u8 > channel.tier {
            metrics::record_scte35_cue("filtered");
            return Ok(None);
        }

        let actor = self.actors.get_or_create(&channel.channel_id);
        let mut guard = self.lock_write(&actor).await?;
        self.hydrate(&channel.channel_id, &mut guard).await?;
        Self::expire_if_needed(&mut guard, channel.grace_s);

        let event_id = cue.event_id.to_string();
        if guard.dedup.contains(&event_id) {
            metrics::record_scte35_cue("duplicate");
            return Ok(None);
        }

        let now = Utc::now().fixed_offset();
        if let Some(active) = &guard.active_break {
            if active.end_time > now {
                metrics::record_scte35_cue("filtered");
                return Ok(None);
            }
        }

        let duration_s = cue.duration_s.unwrap_or(channel.default_ad_duration_s as f32);
        let decision = self.decisions.resolve(channel, &event_id, duration_s).await;
        let start_time = cue.pdt.unwrap_or(now);

        let state = AdBreakState {
            channel_id: channel.channel_id.clone(),
            event_id: event_id.clone(),
            source: BreakSource::Scte35,
            start_time,
            end_time: start_time + chrono::Duration::milliseconds((duration_s * 1000.0) as i64),
            duration_s,
            decision,
            created_at: now,
            scte35: Some(Scte35Context {
                pdt: cue.pdt,
                signal_type: format!("{:?}", cue.command_type),
                event_id: cue.event_id,
            }),
        };

        guard.active_break = Some(state.clone());
        guard.last_served_mode.clear();
        guard.dedup.insert(event_id);
        guard.version += 1;
        self.persist(&channel.channel_id, &guard).await?;
        metrics::record_ad_break_started("scte35");
        metrics::record_scte35_cue("accepted");
        Ok(Some(state))
    }

    /// Scheduler tick (§4.6 Idle -> Active, `time_based_auto_insert`).
    pub async fn scheduled_tick(&self, channel: &ChannelConfig) -> Result<Option<AdBreakState>> {
        if !channel.time_based_auto_insert {
            return Ok(None);
        }

        let actor = self.actors.get_or_create(&channel.channel_id);
        let mut guard = self.lock_write(&actor).await?;
        self.hydrate(&channel.channel_id, &mut guard).await?;
        Self::expire_if_needed(&mut guard, channel.grace_s);

        let now = Utc::now().fixed_offset();
        if let Some(active) = &guard.active_break {
            if active.end_time > now {
                return Ok(None);
            }
        }

        let event_id = format!("sched-{}", now.timestamp());
        let duration_s = channel.default_ad_duration_s as f32;
        let decision = self.decisions.resolve(channel, &event_id, duration_s).await;

        let state = AdBreakState {
            channel_id: channel.channel_id.clone(),
            event_id,
            source: BreakSource::Scheduled,
            start_time: now,
            end_time: now + chrono::Duration::milliseconds((duration_s * 1000.0) as i64),
            duration_s,
            decision,
            created_at: now,
            scte35: None,
        };

        guard.active_break = Some(state.clone());
        guard.last_served_mode.clear();
        guard.version += 1;
        self.persist(&channel.channel_id, &guard).await?;
        metrics::record_ad_break_started("scheduled");
        Ok(Some(state))
    }

    /// Pin the serving mode for `event_id` on first serve; subsequent
    /// calls for the same event return the already-pinned mode (§4.6 "must
    /// never silently swap modes mid-session").
    pub async fn pin_mode(
        &self,
        channel_id: &str,
        event_id: &str,
        preferred: ServedMode,
    ) -> Result<ServedMode> {
        let actor = self.actors.get_or_create(channel_id);
        let mut guard = self.lock_write(&actor).await?;
        self.hydrate(channel_id, &mut guard).await?;

        if let Some(existing) = guard.last_served_mode.get(event_id) {
            return Ok(*existing);
        }

        guard.last_served_mode.insert(event_id.to_string(), preferred);
        self.persist(channel_id, &guard).await?;
        Ok(preferred)
    }

    /// Operator snapshot (`GET /status/{channel}`, §4.8/§6).
    pub async fn status(&self, channel_id: &str) -> Result<CoordinatorSnapshot> {
        let actor = self.actors.get_or_create(channel_id);
        let mut guard = actor.inner.lock().await;
        self.hydrate(channel_id, &mut guard).await?;

        Ok(CoordinatorSnapshot {
            channel_id: channel_id.to_string(),
            active_break: guard.active_break.clone(),
            version: guard.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad::pod::InMemoryPodStore;
    use crate::config::DeliveryMode;
    use crate::kv::MemoryKv;
    use crate::types::CueCommandType;

    fn channel(tier: u8, grace_s: u32) -> ChannelConfig {
        ChannelConfig {
            channel_id: "chan-1".into(),
            organization_slug: "acme".into(),
            channel_slug: "sports1".into(),
            origin_url: "https://origin.example.com/master.m3u8".into(),
            mode: DeliveryMode::Auto,
            scte35_enabled: true,
            scte35_auto_insert: true,
            time_based_auto_insert: true,
            tier,
            bitrate_ladder: vec![800, 1600, 3000],
            default_ad_duration_s: 30,
            vast_enabled: false,
            vast_url: None,
            vast_timeout_ms: 500,
            segment_cache_max_age_s: 6,
            manifest_cache_max_age_s: 2,
            slate_id: None,
            ad_pod_base_url: None,
            sign_host: None,
            grace_s,
        }
    }

    fn coordinator() -> Coordinator {
        let decisions = Arc::new(DecisionEngine::new(
            reqwest::Client::new(),
            Arc::new(InMemoryPodStore::new()),
            Arc::new(MemoryKv::new()),
        ));
        Coordinator::new(
            Arc::new(InProcessActorStore::new()),
            Arc::new(MemoryKv::new()),
            decisions,
            Duration::from_millis(500),
        )
    }

    fn cue(event_id: u32, tier: u16) -> Cue {
        Cue {
            event_id,
            command_type: CueCommandType::SpliceInsert,
            pdt: None,
            duration_s: Some(30.0),
            tier,
            out_of_network_indicator: true,
        }
    }

    #[tokio::test]
    async fn cue_start_then_read_sees_active_break() {
        let coord = coordinator();
        let channel = channel(0, 2);
        coord.cue_start(&channel, Some(30.0), None, None).await.unwrap();

        let view = coord.read(&channel).await.unwrap();
        assert!(view.is_some());
    }

    #[tokio::test]
    async fn duplicate_scte35_event_is_a_noop() {
        let coord = coordinator();
        let channel = channel(0, 2);

        let first = coord.scte35_cue(&channel, &cue(42, 0)).await.unwrap();
        assert!(first.is_some());

        let status_after_first = coord.status(&channel.channel_id).await.unwrap();
        let second = coord.scte35_cue(&channel, &cue(42, 0)).await.unwrap();
        assert!(second.is_none());

        let status_after_second = coord.status(&channel.channel_id).await.unwrap();
        assert_eq!(status_after_first.version, status_after_second.version);
    }

    #[tokio::test]
    async fn tier_filter_blocks_lower_authorization() {
        let coord = coordinator();
        let channel = channel(2, 2);

        let blocked = coord.scte35_cue(&channel, &cue(1, 1)).await.unwrap();
        assert!(blocked.is_none());

        let allowed = coord.scte35_cue(&channel, &cue(2, 2)).await.unwrap();
        assert!(allowed.is_some());
    }

    #[tokio::test]
    async fn cue_stop_clears_active_break() {
        let coord = coordinator();
        let channel = channel(0, 2);
        coord.cue_start(&channel, Some(30.0), None, None).await.unwrap();
        coord.cue_stop(&channel.channel_id).await.unwrap();

        let view = coord.read(&channel).await.unwrap();
        assert!(view.is_none());
    }

    #[tokio::test]
    async fn mode_pin_is_sticky_for_an_event() {
        let coord = coordinator();
        let channel = channel(0, 2);
        let state = coord.cue_start(&channel, Some(30.0), None, None).await.unwrap();

        let first = coord
            .pin_mode(&channel.channel_id, &state.event_id, ServedMode::Sgai)
            .await
            .unwrap();
        let second = coord
            .pin_mode(&channel.channel_id, &state.event_id, ServedMode::Ssai)
            .await
            .unwrap();

        assert_eq!(first, ServedMode::Sgai);
        assert_eq!(second, ServedMode::Sgai);
    }

    #[tokio::test]
    async fn version_increments_on_every_transition() {
        let coord = coordinator();
        let channel = channel(0, 2);
        let before = coord.status(&channel.channel_id).await.unwrap().version;

        coord.cue_start(&channel, Some(30.0), None, None).await.unwrap();
        let after_start = coord.status(&channel.channel_id).await.unwrap().version;
        assert_eq!(after_start, before + 1);

        coord.cue_stop(&channel.channel_id).await.unwrap();
        let after_stop = coord.status(&channel.channel_id).await.unwrap().version;
        assert_eq!(after_stop, after_start + 1);
    }

    #[tokio::test]
    async fn cannot_start_over_a_still_active_break() {
        let coord = coordinator();
        let channel = channel(0, 2);
        coord.cue_start(&channel, Some(30.0), None, None).await.unwrap();

        let result = coord.cue_start(&channel, Some(30.0), None, None).await;
        assert!(result.is_err());
    }
}
