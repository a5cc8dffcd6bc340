//! L2 population: FDB notifications derived from gateway changes
//!
//! Two paths end at the notifier:
//! - new remote MACs: every hardware switch serving the MAC's logical
//!   switch is announced to all agents as a flooding destination.
//! - deleted locators: the tunnels to the vanished endpoint are withdrawn.
//!   When the endpoint was a registered agent the removal is sent to that
//!   agent's host only, for every (logical switch, switch tunnel IP) pair.
//!   Otherwise one fanout removal per logical switch names the endpoint.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-7: Boundary Protection - Tunnel endpoints announced only for bound switches
//! - AU-12: Audit Record Generation - Unresolved MACs logged and counted

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::agent::{tunneling_ip_map, AgentDirectory};
use crate::error::{Result, VtepSyncError};
use crate::fdb::FdbEntries;
use crate::notifier::{Notifier, NotifyTarget};
use crate::resolver::{known_tunnel_ips, tunnel_ips_for_logical_switch};
use crate::store::{fetch, fetch_all, EntityStore, NaturalKey, Table};
use crate::types::{GatewayId, LogicalSwitch, PhysicalLocator, UcastMacRemote};

/// Notifications sent by one L2 population pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L2popStats {
    pub added: usize,
    pub removed: usize,
    pub resolution_failures: usize,
}

impl AddAssign for L2popStats {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.removed += rhs.removed;
        self.resolution_failures += rhs.resolution_failures;
    }
}

/// Gateway state read once per batch of locator deletions
#[derive(Debug, Clone, Default)]
pub struct LocatorCascade {
    pub known_tunnel_ips: BTreeSet<IpAddr>,
    pub agent_hosts: BTreeMap<IpAddr, String>,
    pub logical_switches: Vec<LogicalSwitch>,
}

impl LocatorCascade {
    /// Removals owed for one deleted locator, in send order
    pub fn removals(&self, locator: &PhysicalLocator) -> Vec<(FdbEntries, NotifyTarget)> {
        match self.agent_hosts.get(&locator.destination_ip) {
            Some(host) => self
                .logical_switches
                .iter()
                .flat_map(|ls| {
                    self.known_tunnel_ips.iter().map(move |ip| {
                        (
                            FdbEntries::flooding(ls, *ip),
                            NotifyTarget::Host(host.clone()),
                        )
                    })
                })
                .collect(),
            None => self
                .logical_switches
                .iter()
                .map(|ls| {
                    (
                        FdbEntries::flooding(ls, locator.destination_ip),
                        NotifyTarget::Fanout,
                    )
                })
                .collect(),
        }
    }
}

#[derive(Clone)]
pub struct L2Population {
    store: Arc<dyn EntityStore>,
    agents: Arc<dyn AgentDirectory>,
    notifier: Arc<dyn Notifier>,
    agent_type: String,
}

impl L2Population {
    pub fn new(
        store: Arc<dyn EntityStore>,
        agents: Arc<dyn AgentDirectory>,
        notifier: Arc<dyn Notifier>,
        agent_type: impl Into<String>,
    ) -> Self {
        Self {
            store,
            agents,
            notifier,
            agent_type: agent_type.into(),
        }
    }

    /// Announce flooding destinations for newly learned remote MACs.
    ///
    /// A MAC whose switch chain cannot be resolved is logged and skipped.
    pub async fn sync_remote_macs(
        &self,
        gateway: &GatewayId,
        macs: &[UcastMacRemote],
    ) -> Result<L2popStats> {
        let mut stats = L2popStats::default();

        for mac in macs {
            match self.announce_remote_mac(gateway, mac).await {
                Ok(added) => stats.added += added,
                Err(VtepSyncError::Unresolved { table, key }) => {
                    warn!(
                        gateway = %gateway,
                        mac = %mac.mac,
                        logical_switch = %mac.logical_switch_id,
                        %table,
                        key = %key,
                        "Cannot resolve tunnel endpoints for remote MAC, skipping"
                    );
                    stats.resolution_failures += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(stats)
    }

    async fn announce_remote_mac(&self, gateway: &GatewayId, mac: &UcastMacRemote) -> Result<usize> {
        let store = self.store.as_ref();
        let tunnel_ips = tunnel_ips_for_logical_switch(store, gateway, &mac.logical_switch_id).await?;
        if tunnel_ips.is_empty() {
            debug!(mac = %mac.mac, logical_switch = %mac.logical_switch_id, "No local tunnel endpoints");
            return Ok(0);
        }

        let ls_key = NaturalKey::new(gateway, mac.logical_switch_id.clone());
        let logical_switch: LogicalSwitch = fetch(store, &ls_key)
            .await?
            .ok_or_else(|| VtepSyncError::unresolved(Table::LogicalSwitch, ls_key.to_string()))?;

        for tunnel_ip in &tunnel_ips {
            let entries = FdbEntries::flooding(&logical_switch, *tunnel_ip);
            self.notifier.add_fdb_entries(&entries).await?;
            debug!(network = %logical_switch.name, %tunnel_ip, "Announced flooding entry");
        }
        Ok(tunnel_ips.len())
    }

    /// Read the gateway state the locator cascade works from
    pub async fn locator_cascade(&self, gateway: &GatewayId) -> Result<LocatorCascade> {
        let store = self.store.as_ref();
        let known_tunnel_ips = known_tunnel_ips(store, gateway).await?;
        let agents = self
            .agents
            .list_agents(&self.agent_type)
            .await
            .map_err(|e| match e {
                VtepSyncError::AgentDirectory(_) => e,
                other => VtepSyncError::AgentDirectory(other.to_string()),
            })?;
        let agent_hosts = tunneling_ip_map(agents);
        let logical_switches = fetch_all::<LogicalSwitch>(store, gateway).await?;

        debug!(
            gateway = %gateway,
            tunnel_ips = known_tunnel_ips.len(),
            agents = agent_hosts.len(),
            logical_switches = logical_switches.len(),
            "Prepared locator cascade"
        );

        Ok(LocatorCascade {
            known_tunnel_ips,
            agent_hosts,
            logical_switches,
        })
    }

    /// Send the removals owed for one deleted locator
    pub async fn withdraw_locator(
        &self,
        cascade: &LocatorCascade,
        locator: &PhysicalLocator,
    ) -> Result<L2popStats> {
        let removals = cascade.removals(locator);
        debug!(
            locator = %locator.uuid,
            destination = %locator.destination_ip,
            agent = cascade.agent_hosts.contains_key(&locator.destination_ip),
            count = removals.len(),
            "Withdrawing locator"
        );

        for (entries, target) in &removals {
            self.notifier.remove_fdb_entries(entries, target).await?;
        }

        Ok(L2popStats {
            removed: removals.len(),
            ..L2popStats::default()
        })
    }
}
