//! Shared key-value abstraction backing the channel-config cache (§4.4),
//! the ad-decision memoization cache (§4.5), and — in the `valkey` feature
//! build — the coordinator's durable per-channel state (§4.6/§6).
//!
//! One trait, two backends, exactly as `session::manager::SessionManager`
//! does for sessions: an in-process `DashMap` for dev/tests/single-node,
//! and Valkey/Redis behind the `valkey` feature for a shared fleet.

mod memory;
#[cfg(feature = "valkey")]
mod valkey;

pub use memory::MemoryKv;
#[cfg(feature = "valkey")]
pub use valkey::ValkeyKv;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// A string-keyed, string-valued store with per-key TTL.
///
/// Callers serialize/deserialize their own JSON; the store never
/// interprets values. All operations carry the caller's own timeout via
/// `tokio::time::timeout` — the KV budget of §5 (≤500ms) is enforced by
/// callers, not by this trait.
#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}
