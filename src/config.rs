use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Process-wide configuration loaded from environment variables (§6).
///
/// Mirrors the dev/prod split used throughout this codebase: in dev mode
/// sensible defaults are filled in, in prod the operator must set every
/// variable explicitly.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub base_url: String,
    pub is_dev: bool,
    pub dev_allow_no_auth: bool,
    pub origin_fetch_timeout: Duration,
    pub decision_timeout: Duration,
    pub config_ttl: Duration,
    pub kv_timeout: Duration,
    pub db_timeout: Duration,
    pub lock_acquire_timeout: Duration,
    pub bearer_token: Option<String>,
    /// Channels the SCTE-35 monitor polls at startup (§4.9), read from
    /// `MONITORED_CHANNELS` as a comma-separated list of `channel_id`s.
    pub monitored_channels: Vec<String>,
    #[cfg(feature = "valkey")]
    pub valkey_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let port = if is_dev {
            env::var("PORT").unwrap_or_else(|_| "3000".to_string())
        } else {
            env::var("PORT").map_err(|_| GatewayError::ConfigError("PORT is required in production".into()))?
        }
        .parse()
        .map_err(|e| GatewayError::ConfigError(format!("invalid PORT: {e}")))?;

        let base_url = if is_dev {
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
        } else {
            env::var("BASE_URL")
                .map_err(|_| GatewayError::ConfigError("BASE_URL is required in production".into()))?
        };

        let dev_allow_no_auth = is_dev
            && env::var("DEV_ALLOW_NO_AUTH")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);

        let bearer_token = env::var("CUE_API_TOKEN").ok();
        if !is_dev && bearer_token.is_none() {
            return Err(GatewayError::ConfigError(
                "CUE_API_TOKEN is required in production".into(),
            ));
        }

        let ms = |name: &str, default: u64| -> Result<Duration> {
            let v = env::var(name).unwrap_or_else(|_| default.to_string());
            let parsed: u64 = v
                .parse()
                .map_err(|e| GatewayError::ConfigError(format!("invalid {name}: {e}")))?;
            Ok(Duration::from_millis(parsed))
        };

        let origin_fetch_timeout = ms("ORIGIN_FETCH_TIMEOUT_MS", 5000)?;
        let decision_timeout = ms("DECISION_TIMEOUT_MS", 2000)?;
        let config_ttl = Duration::from_secs(
            env::var("CONFIG_TTL_S")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|e| GatewayError::ConfigError(format!("invalid CONFIG_TTL_S: {e}")))?,
        );
        let kv_timeout = Duration::from_millis(500);
        let db_timeout = Duration::from_secs(1);
        let lock_acquire_timeout = Duration::from_millis(50);

        let monitored_channels = env::var("MONITORED_CHANNELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            port,
            base_url,
            is_dev,
            dev_allow_no_auth,
            origin_fetch_timeout,
            decision_timeout,
            config_ttl,
            kv_timeout,
            db_timeout,
            lock_acquire_timeout,
            bearer_token,
            monitored_channels,
            #[cfg(feature = "valkey")]
            valkey_url: env::var("VALKEY_URL").ok(),
        })
    }
}

/// Delivery mode for a channel (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Auto,
    SgaiOnly,
    SsaiOnly,
}

/// Per-tenant channel configuration (§3).
///
/// Persisted as JSON in the channel-config KV cache and the backing
/// database; loaded through `ChannelConfigCache`, never forwarded as raw
/// JSON through the core (§9 Design Notes).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: String,
    pub organization_slug: String,
    pub channel_slug: String,
    pub origin_url: String,
    pub mode: DeliveryMode,
    pub scte35_enabled: bool,
    pub scte35_auto_insert: bool,
    pub time_based_auto_insert: bool,
    /// SCTE-35 authorization filter: 0 means "accept any tier".
    pub tier: u8,
    /// Strictly ascending, 1..=6 entries.
    pub bitrate_ladder: Vec<u32>,
    pub default_ad_duration_s: u32,
    pub vast_enabled: bool,
    pub vast_url: Option<String>,
    pub vast_timeout_ms: u64,
    pub segment_cache_max_age_s: u32,
    pub manifest_cache_max_age_s: u32,
    pub slate_id: Option<String>,
    pub ad_pod_base_url: Option<String>,
    pub sign_host: Option<String>,
    pub grace_s: u32,
}

impl ChannelConfig {
    /// Validates the invariants spec.md §3 places on a channel record.
    /// Admin mutations go through this before being persisted; the cache
    /// and coordinator trust a `ChannelConfig` once constructed.
    pub fn validate(&self) -> Result<()> {
        if self.bitrate_ladder.is_empty() || self.bitrate_ladder.len() > 6 {
            return Err(GatewayError::ConfigError(
                "bitrate_ladder must have 1..=6 entries".into(),
            ));
        }
        if !self.bitrate_ladder.windows(2).all(|w| w[0] < w[1]) {
            return Err(GatewayError::ConfigError(
                "bitrate_ladder must be strictly ascending".into(),
            ));
        }
        if self.tier > 5 {
            return Err(GatewayError::ConfigError("tier must be 0..5".into()));
        }
        if !(1..=300).contains(&self.segment_cache_max_age_s) {
            return Err(GatewayError::ConfigError(
                "segment_cache_max_age_s must be in [1,300]".into(),
            ));
        }
        if !(1..=30).contains(&self.manifest_cache_max_age_s) {
            return Err(GatewayError::ConfigError(
                "manifest_cache_max_age_s must be in [1,30]".into(),
            ));
        }

        crate::server::url_validation::validate_origin_url(&self.origin_url)?;
        if let Some(vast_url) = &self.vast_url {
            crate::server::url_validation::validate_origin_url(vast_url)?;
        }
        if let Some(pod_base) = &self.ad_pod_base_url {
            crate::server::url_validation::validate_origin_url(pod_base)?;
        }
        Ok(())
    }
}
