//! L2 population notifier
//!
//! Delivers FDB add/remove messages to overlay agents. Delivery is fire and
//! forget: no acknowledgement is awaited and nothing is retried here.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-8: Transmission Confidentiality - Notification bus communication
//! - AU-3: Content of Audit Records - Published messages logged with target

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{debug, instrument};

use crate::error::{Result, VtepSyncError};
use crate::fdb::FdbEntries;
use crate::redis_adapter::RedisAdapter;
use crate::tables::l2pop_methods;

/// Default L2 population update topic
pub const DEFAULT_L2POP_TOPIC: &str = "q-agent-notifier-l2population-update";

/// Who a removal is addressed to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NotifyTarget {
    /// Every agent listening on the topic
    Fanout,
    /// Only the agent running on this host
    Host(String),
}

impl NotifyTarget {
    pub fn host(&self) -> Option<&str> {
        match self {
            NotifyTarget::Fanout => None,
            NotifyTarget::Host(host) => Some(host),
        }
    }
}

impl fmt::Display for NotifyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyTarget::Fanout => f.write_str("fanout"),
            NotifyTarget::Host(host) => write!(f, "host {}", host),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell every agent to learn `entries`
    async fn add_fdb_entries(&self, entries: &FdbEntries) -> Result<()>;

    /// Tell `target` to forget `entries`
    async fn remove_fdb_entries(&self, entries: &FdbEntries, target: &NotifyTarget) -> Result<()>;
}

#[derive(Serialize)]
struct L2popMessage<'a> {
    method: &'static str,
    fdb_entries: &'a FdbEntries,
}

/// Publishes notifications on Redis channels.
///
/// Fanout messages go to `<topic>`, host scoped ones to `<topic>.<host>`.
pub struct RedisNotifier {
    redis: RedisAdapter,
    topic: String,
}

impl RedisNotifier {
    pub fn new(redis: RedisAdapter, topic: impl Into<String>) -> Self {
        Self {
            redis,
            topic: topic.into(),
        }
    }

    fn channel(&self, target: &NotifyTarget) -> String {
        channel_for(&self.topic, target)
    }

    async fn publish(
        &self,
        method: &'static str,
        entries: &FdbEntries,
        target: &NotifyTarget,
    ) -> Result<()> {
        let payload = serde_json::to_string(&L2popMessage {
            method,
            fdb_entries: entries,
        })?;
        let channel = self.channel(target);
        self.redis
            .publish(&channel, &payload)
            .await
            .map_err(|e| VtepSyncError::notify(format!("{} on {}: {}", method, channel, e)))?;
        debug!(method, channel = %channel, "Sent L2 population message");
        Ok(())
    }
}

fn channel_for(topic: &str, target: &NotifyTarget) -> String {
    match target {
        NotifyTarget::Fanout => topic.to_string(),
        NotifyTarget::Host(host) => format!("{}.{}", topic, host),
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    #[instrument(skip_all)]
    async fn add_fdb_entries(&self, entries: &FdbEntries) -> Result<()> {
        self.publish(l2pop_methods::ADD_FDB_ENTRIES, entries, &NotifyTarget::Fanout)
            .await
    }

    #[instrument(skip(self, entries), fields(target = %target))]
    async fn remove_fdb_entries(&self, entries: &FdbEntries, target: &NotifyTarget) -> Result<()> {
        self.publish(l2pop_methods::REMOVE_FDB_ENTRIES, entries, target)
            .await
    }
}
