//! Configuration file support for vtepsyncd
//!
//! Loads and validates vtepsyncd configuration from TOML files.
//! Default location: /etc/sonic/vtepsyncd.conf
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-2: Baseline Configuration - Default configuration values
//! - CM-6: Configuration Settings - Validated settings loaded from file

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::agent::DEFAULT_AGENT_TYPE;
use crate::error::{Result, VtepSyncError};
use crate::notifier::DEFAULT_L2POP_TOPIC;
use crate::tables::OVERLAY_AGENT_TABLE;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/vtepsyncd.conf";

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Redis host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Redis port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Redis database number holding the gateway tables
    #[serde(default = "default_db_number")]
    pub db_number: u32,

    /// List the OVSDB monitor pushes change-sets onto
    #[serde(default = "default_changeset_queue")]
    pub changeset_queue: String,

    /// Blocking pop timeout in seconds
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

/// Where the overlay agent directory comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    Redis,
    Static,
}

/// Statically configured overlay agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticAgentConfig {
    pub host: String,
    pub tunneling_ip: IpAddr,
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
}

/// Agent directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent class taking part in L2 population
    #[serde(default = "default_agent_type")]
    pub agent_type: String,

    #[serde(default = "default_agent_source")]
    pub source: AgentSource,

    /// Table listing agents when `source = "redis"`
    #[serde(default = "default_agent_table")]
    pub agent_table: String,

    /// Agents when `source = "static"`
    #[serde(default)]
    pub static_agents: Vec<StaticAgentConfig>,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Channel prefix for L2 population messages
    #[serde(default = "default_topic")]
    pub topic: String,
}

/// Complete vtepsyncd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VtepsyncConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub agents: AgentConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,
}

// Default functions
fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_db_number() -> u32 {
    0
}

fn default_changeset_queue() -> String {
    "HWVTEP_CHANGESET_QUEUE".to_string()
}

fn default_poll_timeout() -> u64 {
    1
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_agent_type() -> String {
    DEFAULT_AGENT_TYPE.to_string()
}

fn default_agent_source() -> AgentSource {
    AgentSource::Redis
}

fn default_agent_table() -> String {
    OVERLAY_AGENT_TABLE.to_string()
}

fn default_topic() -> String {
    DEFAULT_L2POP_TOPIC.to_string()
}

// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
            db_number: default_db_number(),
            changeset_queue: default_changeset_queue(),
            poll_timeout_secs: default_poll_timeout(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_type: default_agent_type(),
            source: default_agent_source(),
            agent_table: default_agent_table(),
            static_agents: Vec::new(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
        }
    }
}

impl VtepsyncConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                VtepSyncError::Config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(VtepSyncError::Io(e)),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.database.connection_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.database.poll_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.redis_port == 0 {
            return Err(VtepSyncError::Config("redis_port must be > 0".to_string()));
        }

        if self.database.changeset_queue.is_empty() {
            return Err(VtepSyncError::Config(
                "changeset_queue must not be empty".to_string(),
            ));
        }

        if self.database.poll_timeout_secs == 0 {
            return Err(VtepSyncError::Config(
                "poll_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.agents.agent_type.is_empty() {
            return Err(VtepSyncError::Config("agent_type must not be empty".to_string()));
        }

        if self.agents.source == AgentSource::Static && self.agents.static_agents.is_empty() {
            warn!("Static agent directory configured without agents");
        }

        if self.notifier.topic.is_empty() {
            return Err(VtepSyncError::Config("topic must not be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = VtepsyncConfig::default();
        assert_eq!(config.database.redis_host, "127.0.0.1");
        assert_eq!(config.database.redis_port, 6379);
        assert_eq!(config.agents.agent_type, "Open vSwitch agent");
        assert_eq!(config.agents.source, AgentSource::Redis);
        assert_eq!(config.notifier.topic, "q-agent-notifier-l2population-update");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_redis_port() {
        let mut config = VtepsyncConfig::default();
        config.database.redis_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_poll_timeout() {
        let mut config = VtepsyncConfig::default();
        config.database.poll_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_topic() {
        let mut config = VtepsyncConfig::default();
        config.notifier.topic.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = VtepsyncConfig::default();
        assert_eq!(config.connection_timeout(), Duration::from_secs(5));
        assert_eq!(config.poll_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[database]
redis_host = "192.168.1.1"
changeset_queue = "OVSDB_CHANGES"

[agents]
source = "static"

[[agents.static_agents]]
host = "compute-1"
tunneling_ip = "10.0.0.5"
"#;
        let config: VtepsyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.redis_host, "192.168.1.1");
        assert_eq!(config.database.changeset_queue, "OVSDB_CHANGES");
        // Unspecified values should use defaults
        assert_eq!(config.database.redis_port, 6379);
        assert_eq!(config.agents.source, AgentSource::Static);
        assert_eq!(config.agents.static_agents.len(), 1);
        assert_eq!(config.agents.static_agents[0].agent_type, "Open vSwitch agent");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[notifier]\ntopic = \"l2pop\"").unwrap();

        let config = VtepsyncConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.notifier.topic, "l2pop");
        assert_eq!(config.agents.agent_table, "OVERLAY_AGENT");
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database\nredis_port = ").unwrap();
        let err = VtepsyncConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, VtepSyncError::Config(_)));
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = VtepsyncConfig::load_or_default("/nonexistent/path.conf").unwrap();
        assert_eq!(config.database.redis_host, "127.0.0.1");
    }
}
