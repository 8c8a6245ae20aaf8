use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::Kv;
use crate::error::Result;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process `Kv` backend for dev, tests, and single-node deployments.
///
/// Mirrors `session::manager::SessionManager`'s `Memory` backend: a
/// `DashMap` guarded by nothing more than its own internal sharding, with
/// lazy expiry (checked on read, never proactively swept).
#[derive(Clone, Default)]
pub struct MemoryKv {
    entries: std::sync::Arc<DashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let live = self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone());

        if live.is_none() {
            self.entries.remove(key);
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
