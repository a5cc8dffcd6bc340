//! VTEP Sync Daemon - hardware VTEP change-set reconciliation
//!
//! vtepsyncd keeps the hardware VTEP gateway tables in step with the
//! change-sets reported by each gateway's OVSDB monitor, handling:
//! - Logical/physical switch, port, locator and MAC reconciliation
//! - VLAN binding replacement on port modification
//! - Cascading deletes so no binding or MAC outlives its parent
//! - L2 population FDB notifications for overlay agents

pub mod agent;
pub mod change_set;
pub mod config_file;
pub mod error;
pub mod fdb;
pub mod l2pop;
pub mod memory_store;
pub mod notifier;
pub mod reconciler;
pub mod redis_adapter;
pub mod redis_store;
pub mod resolver;
pub mod store;
pub mod tables;
pub mod types;
pub mod vtep_sync;

pub use agent::{AgentDirectory, AgentInfo, RedisAgentDirectory, StaticAgentDirectory};
pub use change_set::{ChangeBatch, ChangeMessage, ChangeSet};
pub use config_file::VtepsyncConfig;
pub use error::{Result, VtepSyncError};
pub use fdb::{FdbEntries, FdbPortEntry, FLOODING_ENTRY};
pub use memory_store::MemoryStore;
pub use notifier::{Notifier, NotifyTarget, RedisNotifier};
pub use redis_adapter::RedisAdapter;
pub use redis_store::RedisEntityStore;
pub use store::{EntityStore, NaturalKey, Row, Table};
pub use types::{
    GatewayId, LogicalSwitch, MacAddress, PhysicalLocator, PhysicalPort, PhysicalSwitch,
    UcastMacLocal, UcastMacRemote, VlanBinding,
};
pub use vtep_sync::{ProcessSummary, VtepSync, VtepSyncStats};
