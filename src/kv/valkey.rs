use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::Kv;
use crate::error::{GatewayError, Result};

/// Valkey/Redis-backed `Kv`, used when the `valkey` feature is enabled and
/// the operator configures `VALKEY_URL` — the shared-fleet counterpart to
/// `MemoryKv`, following `session::manager::SessionManager`'s
/// `Backend::Valkey` shape.
#[derive(Clone)]
pub struct ValkeyKv {
    conn: ConnectionManager,
}

impl ValkeyKv {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GatewayError::StorageFailure(format!("valkey client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::StorageFailure(format!("valkey connect: {e}")))?;
        tracing::info!("Connected to Valkey at {}", url);
        Ok(Self { conn })
    }
}

#[async_trait]
impl Kv for ValkeyKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::StorageFailure(format!("valkey GET: {e}")))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| GatewayError::StorageFailure(format!("valkey SET: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| GatewayError::StorageFailure(format!("valkey DEL: {e}")))
    }
}
