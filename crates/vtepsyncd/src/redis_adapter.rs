//! Redis adapter for the gateway database and notification bus
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-8: Transmission Confidentiality - Database communication
//! - AU-3: Content of Audit Records - Database operations logged

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::Result;

/// Thin wrapper over a managed Redis connection.
///
/// `ConnectionManager` is cheap to clone and reconnects on its own, so each
/// call works on a clone and the adapter can be shared behind `&self`.
#[derive(Clone)]
pub struct RedisAdapter {
    conn: ConnectionManager,
}

impl RedisAdapter {
    #[instrument(skip(timeout))]
    pub async fn connect(host: &str, port: u16, db: u32, timeout: Duration) -> Result<Self> {
        let url = format!("redis://{}:{}/{}", host, port, db);
        debug!(url = %url, "Connecting to Redis");

        let client = Client::open(url)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("Redis connection to {}:{} timed out", host, port),
                )
            })??;

        debug!("Connected to Redis");
        Ok(Self { conn })
    }

    #[instrument(skip(self))]
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    /// Create hash `key` holding every one of `fields` unless the key exists.
    /// The existence check and the write run as one script, so a failed call
    /// never leaves a partial row behind.
    #[instrument(skip(self, fields))]
    pub async fn hset_all_nx(&self, key: &str, fields: &[(&str, String)]) -> Result<bool> {
        let script = redis::Script::new(
            r#"
            if redis.call('exists', KEYS[1]) == 1 then
                return 0
            end
            redis.call('hset', KEYS[1], unpack(ARGV))
            return 1
            "#,
        );

        let mut invocation = script.prepare_invoke();
        invocation.key(key);
        for (field, value) in fields {
            invocation.arg(*field).arg(value.as_str());
        }

        let mut conn = self.conn.clone();
        let created: i64 = invocation.invoke_async(&mut conn).await?;
        debug!(key, created = created > 0, "HSET if absent");
        Ok(created > 0)
    }

    #[instrument(skip(self, fields))]
    pub async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    /// Delete a key. Returns whether it existed.
    #[instrument(skip(self))]
    pub async fn del(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    #[instrument(skip(self))]
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.keys(pattern).await?)
    }

    #[instrument(skip(self, message))]
    pub async fn publish(&self, channel: &str, message: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let receivers: u64 = conn.publish(channel, message).await?;
        debug!(channel, receivers, "Published message");
        Ok(receivers)
    }

    /// Pop the head of a list, waiting up to `timeout`
    #[instrument(skip(self))]
    pub async fn blpop(&self, list: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn.blpop(list, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, value)| value))
    }

    /// Push back to the head of a list
    #[instrument(skip(self, value))]
    pub async fn lpush(&self, list: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(list, value).await?;
        Ok(())
    }
}
