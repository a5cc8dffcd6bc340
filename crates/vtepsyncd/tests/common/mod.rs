//! Shared fixtures for vtepsyncd integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use sonic_vtepsyncd::agent::DEFAULT_AGENT_TYPE;
use sonic_vtepsyncd::{
    AgentInfo, ChangeSet, FdbEntries, GatewayId, MemoryStore, Notifier, NotifyTarget,
    ProcessSummary, StaticAgentDirectory, VtepSync,
};
use std::net::IpAddr;
use parking_lot::Mutex;
use std::sync::Arc;

/// A notification captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Add(FdbEntries),
    Remove(FdbEntries, NotifyTarget),
}

impl Sent {
    pub fn entries(&self) -> &FdbEntries {
        match self {
            Sent::Add(entries) | Sent::Remove(entries, _) => entries,
        }
    }
}

/// Notifier that records every call in order
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn adds(&self) -> Vec<FdbEntries> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Add(entries) => Some(entries),
                Sent::Remove(..) => None,
            })
            .collect()
    }

    pub fn removes(&self) -> Vec<(FdbEntries, NotifyTarget)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Remove(entries, target) => Some((entries, target)),
                Sent::Add(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn add_fdb_entries(&self, entries: &FdbEntries) -> sonic_vtepsyncd::Result<()> {
        self.sent.lock().push(Sent::Add(entries.clone()));
        Ok(())
    }

    async fn remove_fdb_entries(
        &self,
        entries: &FdbEntries,
        target: &NotifyTarget,
    ) -> sonic_vtepsyncd::Result<()> {
        self.sent
            .lock()
            .push(Sent::Remove(entries.clone(), target.clone()));
        Ok(())
    }
}

/// Engine wired to an in-memory store and a recording notifier
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub notifier: RecordingNotifier,
    pub sync: VtepSync,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_agents(StaticAgentDirectory::new())
    }

    pub fn with_agents(agents: StaticAgentDirectory) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();
        let sync = VtepSync::new(store.clone(), Arc::new(agents), Arc::new(notifier.clone()));
        Self {
            store,
            notifier,
            sync,
        }
    }

    pub async fn apply(&self, gateway: &GatewayId, changes: Value) -> ProcessSummary {
        let changes: ChangeSet = serde_json::from_value(changes).unwrap();
        self.sync.process(gateway, changes).await.unwrap()
    }
}

pub fn gateway(id: &str) -> GatewayId {
    GatewayId::new(id).unwrap()
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn agent(host: &str, tunneling_ip: &str) -> StaticAgentDirectory {
    StaticAgentDirectory::new()
        .with_agent(DEFAULT_AGENT_TYPE, AgentInfo::new(host, ip(tunneling_ip)))
}

pub fn logical_switch(uuid: &str, name: &str, key: u32) -> Value {
    json!({"uuid": uuid, "name": name, "key": key})
}

pub fn physical_switch(uuid: &str, tunnel_ip: Option<&str>) -> Value {
    match tunnel_ip {
        Some(ip) => json!({"uuid": uuid, "name": uuid, "tunnel_ip": ip}),
        None => json!({"uuid": uuid, "name": uuid, "tunnel_ip": ["set", []]}),
    }
}

pub fn physical_port(uuid: &str, switch: &str, bindings: &[(&str, u16)]) -> Value {
    let bindings: Vec<Value> = bindings
        .iter()
        .map(|(ls, vlan)| json!({"logical_switch_uuid": ls, "vlan": vlan}))
        .collect();
    json!({
        "uuid": uuid,
        "name": uuid,
        "physical_switch_id": switch,
        "port_fault_status": ["set", []],
        "vlan_bindings": bindings,
    })
}

pub fn locator(uuid: &str, dst_ip: &str) -> Value {
    json!({"uuid": uuid, "dst_ip": dst_ip})
}

pub fn remote_mac(uuid: &str, mac: &str, ls: &str, locator: &str) -> Value {
    json!({
        "uuid": uuid,
        "mac": mac,
        "logical_switch_id": ls,
        "physical_locator_id": locator,
    })
}

pub fn deleted(uuid: &str) -> Value {
    json!({"uuid": uuid})
}
