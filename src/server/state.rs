use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use crate::ad::{DecisionEngine, InMemoryPodStore, PodStore};
use crate::channel_config::{ChannelConfigCache, InMemoryConfigStore};
use crate::config::Config;
use crate::coordinator::{Coordinator, InProcessActorStore};
use crate::kv::Kv;
use crate::scte35_monitor::Scte35Monitor;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http_client: Client,
    pub config_cache: Arc<ChannelConfigCache>,
    /// Concrete handle to the dev/test config store, for bootstrap
    /// registration — admin CRUD on channel records is out of scope.
    pub config_store: Arc<InMemoryConfigStore>,
    /// Concrete handle to the dev/test pod store, for bootstrap
    /// registration — see `config_store`.
    pub pod_store: Arc<InMemoryPodStore>,
    pub coordinator: Arc<Coordinator>,
    pub monitor: Arc<Scte35Monitor>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(config: Config) -> Self {
        let http_client = Client::builder()
            .timeout(config.origin_fetch_timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .expect("failed to build HTTP client");

        let kv: Arc<dyn Kv> = build_kv(&config).await;

        let config_store = Arc::new(InMemoryConfigStore::new());
        let config_cache = Arc::new(ChannelConfigCache::new(
            Arc::clone(&kv),
            Arc::clone(&config_store) as Arc<dyn crate::channel_config::ConfigStore>,
        ));

        let pod_store = Arc::new(InMemoryPodStore::new());
        let decisions = Arc::new(DecisionEngine::new(
            http_client.clone(),
            Arc::clone(&pod_store) as Arc<dyn PodStore>,
            Arc::clone(&kv),
        ));

        let coordinator = Arc::new(Coordinator::new(
            Arc::new(InProcessActorStore::new()),
            Arc::clone(&kv),
            decisions,
            config.kv_timeout,
        ));

        let monitor = Arc::new(Scte35Monitor::new(
            http_client.clone(),
            Arc::clone(&config_cache),
            Arc::clone(&coordinator),
        ));

        Self {
            config: Arc::new(config),
            http_client,
            config_cache,
            config_store,
            pod_store,
            coordinator,
            monitor,
            started_at: Instant::now(),
        }
    }

    /// Spawn the background SCTE-35 poller for every channel named in
    /// `Config::monitored_channels` (§4.9).
    pub fn start_monitors(&self) {
        for channel_id in &self.config.monitored_channels {
            self.monitor.spawn(channel_id.clone());
        }
    }
}

#[cfg(feature = "valkey")]
async fn build_kv(config: &Config) -> Arc<dyn Kv> {
    match config.valkey_url.as_deref() {
        Some(url) => {
            let client = crate::kv::ValkeyKv::connect(url)
                .await
                .expect("failed to connect to Valkey");
            Arc::new(client)
        }
        None => Arc::new(crate::kv::MemoryKv::new()),
    }
}

#[cfg(not(feature = "valkey"))]
async fn build_kv(_config: &Config) -> Arc<dyn Kv> {
    Arc::new(crate::kv::MemoryKv::new())
}
