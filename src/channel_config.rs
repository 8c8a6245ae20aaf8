//! Channel-Config Cache (§4.4): read-through cache over a pluggable
//! `ConfigStore`, backed by the shared `Kv` trait used elsewhere in the
//! caching plane (§4.5's decision cache, §4.6's durable coordinator state).
//!
//! The admin CRUD surface that authors channel records is out of scope;
//! this module only consumes `ConfigStore::load_by_slug`/`load_by_id`. The
//! in-memory store below is the dev/test stand-in, following the same
//! relationship `kv::MemoryKv` has to `kv::ValkeyKv`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::ChannelConfig;
use crate::error::{GatewayError, Result};
use crate::kv::Kv;
use crate::metrics;

const CONFIG_TTL: Duration = Duration::from_secs(60);

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_by_slug(&self, org: &str, slug: &str) -> Result<Option<ChannelConfig>>;
    async fn load_by_id(&self, channel_id: &str) -> Result<Option<ChannelConfig>>;
}

/// In-memory `ConfigStore`, keyed by `(org, slug)` and mirrored by
/// `channel_id` — the admin-mutation stand-in for dev/tests.
#[derive(Default)]
pub struct InMemoryConfigStore {
    by_slug: RwLock<HashMap<(String, String), ChannelConfig>>,
    by_id: RwLock<HashMap<String, ChannelConfig>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admin-mutation stand-in: insert or replace a channel record.
    pub fn upsert(&self, config: ChannelConfig) {
        let key = (config.organization_slug.clone(), config.channel_slug.clone());
        self.by_id
            .write()
            .unwrap()
            .insert(config.channel_id.clone(), config.clone());
        self.by_slug.write().unwrap().insert(key, config);
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load_by_slug(&self, org: &str, slug: &str) -> Result<Option<ChannelConfig>> {
        Ok(self
            .by_slug
            .read()
            .unwrap()
            .get(&(org.to_string(), slug.to_string()))
            .cloned())
    }

    async fn load_by_id(&self, channel_id: &str) -> Result<Option<ChannelConfig>> {
        Ok(self.by_id.read().unwrap().get(channel_id).cloned())
    }
}

fn slug_key(org: &str, slug: &str) -> String {
    format!("config:{org}:{slug}")
}

fn id_key(channel_id: &str) -> String {
    format!("config:id:{channel_id}")
}

/// Read-through `ChannelConfig` cache (§4.4).
pub struct ChannelConfigCache {
    kv: Arc<dyn Kv>,
    store: Arc<dyn ConfigStore>,
}

impl ChannelConfigCache {
    pub fn new(kv: Arc<dyn Kv>, store: Arc<dyn ConfigStore>) -> Self {
        Self { kv, store }
    }

    /// Read-through lookup by `(org, slug)` — the viewer request path's key.
    pub async fn get(&self, org: &str, slug: &str) -> Result<ChannelConfig> {
        let key = slug_key(org, slug);
        if let Some(cached) = self.kv.get(&key).await? {
            if let Ok(config) = serde_json::from_str(&cached) {
                metrics::record_config_cache("hit");
                return Ok(config);
            }
        }

        metrics::record_config_cache("miss");
        let config = self
            .store
            .load_by_slug(org, slug)
            .await?
            .ok_or_else(|| GatewayError::ChannelNotFound(format!("{org}/{slug}")))?;

        self.populate(&config).await;
        Ok(config)
    }

    /// Read-through lookup by `channel_id` — used by the coordinator and
    /// the SCTE-35 monitor, which address channels by id.
    pub async fn get_by_id(&self, channel_id: &str) -> Result<ChannelConfig> {
        let key = id_key(channel_id);
        if let Some(cached) = self.kv.get(&key).await? {
            if let Ok(config) = serde_json::from_str(&cached) {
                metrics::record_config_cache("hit");
                return Ok(config);
            }
        }

        metrics::record_config_cache("miss");
        let config = self
            .store
            .load_by_id(channel_id)
            .await?
            .ok_or_else(|| GatewayError::ChannelNotFound(channel_id.to_string()))?;

        self.populate(&config).await;
        Ok(config)
    }

    async fn populate(&self, config: &ChannelConfig) {
        if let Ok(serialized) = serde_json::to_string(config) {
            let _ = self
                .kv
                .set(&slug_key(&config.organization_slug, &config.channel_slug), serialized.clone(), CONFIG_TTL)
                .await;
            let _ = self
                .kv
                .set(&id_key(&config.channel_id), serialized, CONFIG_TTL)
                .await;
        }
    }

    /// Delete both cache keys. Called synchronously from every admin
    /// mutation of the channel record (§4.4).
    pub async fn invalidate(&self, org: &str, slug: &str, channel_id: &str) -> Result<()> {
        self.kv.delete(&slug_key(org, slug)).await?;
        self.kv.delete(&id_key(channel_id)).await?;
        metrics::record_config_cache("invalidate");
        info!("invalidated channel-config cache for {org}/{slug} ({channel_id})");
        Ok(())
    }

    /// Fire-and-forget prefetch to absorb cache stampede after invalidation.
    pub fn warm(self: &Arc<Self>, org: String, slug: String) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = cache.get(&org, &slug).await {
                tracing::warn!("warm prefetch failed for {org}/{slug}: {e}");
            }
        });
    }
}
