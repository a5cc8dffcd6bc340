//! Overlay agent directory
//!
//! Maps registered overlay agents to the host they run on, keyed by the
//! tunneling IP they advertise. The directory is injected into
//! [`VtepSync`](crate::VtepSync) at construction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, instrument};

use crate::config_file::StaticAgentConfig;
use crate::error::Result;
use crate::redis_adapter::RedisAdapter;
use crate::tables::{agent_fields, glob_escape, KEY_SEPARATOR};

/// Agent class whose tunnel endpoints take part in L2 population
pub const DEFAULT_AGENT_TYPE: &str = "Open vSwitch agent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub host: String,
    pub tunneling_ip: IpAddr,
}

impl AgentInfo {
    pub fn new(host: impl Into<String>, tunneling_ip: IpAddr) -> Self {
        Self {
            host: host.into(),
            tunneling_ip,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Currently registered agents of `agent_type`
    async fn list_agents(&self, agent_type: &str) -> Result<Vec<AgentInfo>>;
}

/// Tunneling IP to host. When two agents share an IP the later one wins.
pub fn tunneling_ip_map(agents: Vec<AgentInfo>) -> BTreeMap<IpAddr, String> {
    agents
        .into_iter()
        .map(|agent| (agent.tunneling_ip, agent.host))
        .collect()
}

/// Directory populated from the config file
#[derive(Debug, Clone, Default)]
pub struct StaticAgentDirectory {
    agents: Vec<(String, AgentInfo)>,
}

impl StaticAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent_type: impl Into<String>, agent: AgentInfo) -> Self {
        self.agents.push((agent_type.into(), agent));
        self
    }

    pub fn from_config(entries: &[StaticAgentConfig]) -> Self {
        entries.iter().fold(Self::new(), |dir, entry| {
            dir.with_agent(
                entry.agent_type.clone(),
                AgentInfo::new(entry.host.clone(), entry.tunneling_ip),
            )
        })
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn list_agents(&self, agent_type: &str) -> Result<Vec<AgentInfo>> {
        Ok(self
            .agents
            .iter()
            .filter(|(t, _)| t == agent_type)
            .map(|(_, agent)| agent.clone())
            .collect())
    }
}

/// Directory backed by the `OVERLAY_AGENT` table
pub struct RedisAgentDirectory {
    redis: RedisAdapter,
    table: String,
}

impl RedisAgentDirectory {
    pub fn new(redis: RedisAdapter, table: impl Into<String>) -> Self {
        Self {
            redis,
            table: table.into(),
        }
    }
}

/// Decode one agent row, skipping rows of another class or without a tunnel
fn agent_from_fields(
    key: &str,
    agent_type: &str,
    fields: &std::collections::HashMap<String, String>,
) -> Option<AgentInfo> {
    if fields.get(agent_fields::AGENT_TYPE).map(String::as_str) != Some(agent_type) {
        return None;
    }
    let host = fields.get(agent_fields::HOST)?;
    match fields
        .get(agent_fields::TUNNELING_IP)
        .and_then(|ip| ip.parse().ok())
    {
        Some(ip) => Some(AgentInfo::new(host.clone(), ip)),
        None => {
            debug!(key, host = %host, "Agent has no usable tunneling_ip");
            None
        }
    }
}

#[async_trait]
impl AgentDirectory for RedisAgentDirectory {
    #[instrument(skip(self))]
    async fn list_agents(&self, agent_type: &str) -> Result<Vec<AgentInfo>> {
        let pattern = format!("{}{}*", glob_escape(&self.table), KEY_SEPARATOR);
        let mut keys = self.redis.keys(&pattern).await?;
        // KEYS has no defined order; keep "last wins" deterministic
        keys.sort();

        let mut agents = Vec::with_capacity(keys.len());
        for key in keys {
            let fields = self.redis.hgetall(&key).await?;
            if let Some(agent) = agent_from_fields(&key, agent_type, &fields) {
                agents.push(agent);
            }
        }

        debug!(count = agents.len(), "Listed overlay agents");
        Ok(agents)
    }
}
