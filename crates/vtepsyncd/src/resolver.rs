//! Locator resolution
//!
//! Walks VLAN binding -> physical port -> physical switch to find the
//! tunnel IPs of the hardware switches serving a logical switch.

use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::debug;

use crate::error::{Result, VtepSyncError};
use crate::store::{bindings_of_logical_switch, fetch, fetch_all, EntityStore, NaturalKey, Table};
use crate::types::{GatewayId, PhysicalPort, PhysicalSwitch};

/// Tunnel IPs of every physical switch backing a port bound to
/// `logical_switch_id`, deduplicated.
///
/// A binding whose port or switch is missing fails the whole resolution
/// with [`VtepSyncError::Unresolved`]. Switches without a tunnel IP
/// contribute nothing.
pub async fn tunnel_ips_for_logical_switch(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    logical_switch_id: &str,
) -> Result<BTreeSet<IpAddr>> {
    let mut tunnel_ips = BTreeSet::new();

    for binding in bindings_of_logical_switch(store, gateway, logical_switch_id).await? {
        let port_key = NaturalKey::new(gateway, binding.port_uuid.clone());
        let port: PhysicalPort = fetch(store, &port_key)
            .await?
            .ok_or_else(|| VtepSyncError::unresolved(Table::PhysicalPort, port_key.to_string()))?;

        let switch_key = NaturalKey::new(gateway, port.physical_switch_id.clone());
        let switch: PhysicalSwitch = fetch(store, &switch_key).await?.ok_or_else(|| {
            VtepSyncError::unresolved(Table::PhysicalSwitch, switch_key.to_string())
        })?;

        match switch.tunnel_ip {
            Some(ip) => {
                tunnel_ips.insert(ip);
            }
            None => debug!(switch = %switch.uuid, "Physical switch has no tunnel IP"),
        }
    }

    Ok(tunnel_ips)
}

/// Tunnel IPs of all physical switches of a gateway
pub async fn known_tunnel_ips(
    store: &dyn EntityStore,
    gateway: &GatewayId,
) -> Result<BTreeSet<IpAddr>> {
    Ok(fetch_all::<PhysicalSwitch>(store, gateway)
        .await?
        .into_iter()
        .filter_map(|switch| switch.tunnel_ip)
        .collect())
}
