//! FDB entry payloads for L2 population
//!
//! Payload shape, keyed by network id (the logical switch name):
//!
//! ```text
//! {"net-a": {"segment_id": 5001, "network_type": "vxlan",
//!            "ports": {"10.0.0.1": [["00:00:00:00:00:00", "0.0.0.0"]]}}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use crate::types::{LogicalSwitch, MacAddress};

pub const NETWORK_TYPE_VXLAN: &str = "vxlan";

/// A (mac, ip) pair in a port list, serialized as a two element array
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FdbPortEntry(pub MacAddress, pub IpAddr);

/// Sentinel entry standing for broadcast, unknown unicast and multicast
pub const FLOODING_ENTRY: FdbPortEntry =
    FdbPortEntry(MacAddress::ZERO, IpAddr::V4(Ipv4Addr::UNSPECIFIED));

impl FdbPortEntry {
    pub fn is_flooding(&self) -> bool {
        *self == FLOODING_ENTRY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFdb {
    /// `null` when the logical switch carries no tunnel key
    pub segment_id: Option<u32>,
    pub network_type: String,
    pub ports: BTreeMap<IpAddr, Vec<FdbPortEntry>>,
}

/// FDB update keyed by network id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FdbEntries(BTreeMap<String, NetworkFdb>);

impl FdbEntries {
    /// Flooding entry for `logical_switch` addressed to `tunnel_ip`
    pub fn flooding(logical_switch: &LogicalSwitch, tunnel_ip: IpAddr) -> Self {
        let mut ports = BTreeMap::new();
        ports.insert(tunnel_ip, vec![FLOODING_ENTRY]);

        let mut entries = BTreeMap::new();
        entries.insert(
            logical_switch.name.clone(),
            NetworkFdb {
                segment_id: logical_switch.segment_key,
                network_type: NETWORK_TYPE_VXLAN.to_string(),
                ports,
            },
        );
        Self(entries)
    }

    pub fn network(&self, network_id: &str) -> Option<&NetworkFdb> {
        self.0.get(network_id)
    }

    pub fn networks(&self) -> impl Iterator<Item = (&String, &NetworkFdb)> {
        self.0.iter()
    }

    /// Every tunnel IP addressed by the payload
    pub fn tunnel_ips(&self) -> Vec<IpAddr> {
        self.0
            .values()
            .flat_map(|network| network.ports.keys().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
