//! Hardware VTEP entity types
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-8: System Component Inventory - Gateway switches, ports and locators
//! - AC-4: Information Flow Enforcement - Per-gateway scoping of every entity
//!
//! Every entity is scoped by the [`GatewayId`] of the management session
//! that reported it. Entities are immutable values: the dispatcher derives
//! them from change records by stamping a gateway id, and reconcilers
//! replace rows wholesale instead of patching them in place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of one hardware gateway management session.
///
/// The id is spliced into `|`-separated store keys and key patterns, so the
/// separator and glob metacharacters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GatewayId(String);

/// Characters a gateway id may not contain
pub const GATEWAY_ID_RESERVED: &[char] = &['|', '*', '?', '[', ']', '\\'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid gateway id {0:?}: must be non-empty without '|', '*', '?', '[', ']' or '\\'")]
pub struct GatewayIdError(String);

impl GatewayId {
    pub fn new(id: impl Into<String>) -> Result<Self, GatewayIdError> {
        let id = id.into();
        if id.is_empty() || id.contains(GATEWAY_ID_RESERVED) {
            return Err(GatewayIdError(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GatewayId {
    type Err = GatewayIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for GatewayId {
    type Error = GatewayIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<GatewayId> for String {
    fn from(gateway: GatewayId) -> String {
        gateway.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid MAC address: {0}")]
pub struct MacParseError(String);

/// A 48-bit Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The zero MAC address (00:00:00:00:00:00), used by the flooding entry.
    pub const ZERO: MacAddress = MacAddress([0, 0, 0, 0, 0, 0]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        MacAddress(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0[0] == 0
            && self.0[1] == 0
            && self.0[2] == 0
            && self.0[3] == 0
            && self.0[4] == 0
            && self.0[5] == 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // OVSDB reports colon separated, some gateways use hyphens
        let separator = if s.contains(':') { ':' } else { '-' };

        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(MacParseError(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] =
                u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

/// Overlay network bound to a VXLAN segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalSwitch {
    pub uuid: String,
    pub gateway: GatewayId,
    /// Network identifier advertised in FDB entries
    pub name: String,
    /// VXLAN network identifier, None while the gateway leaves it unset
    pub segment_key: Option<u32>,
}

/// Hardware switch terminating VXLAN tunnels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalSwitch {
    pub uuid: String,
    pub gateway: GatewayId,
    pub name: String,
    /// None when the gateway has not configured a tunnel source yet
    pub tunnel_ip: Option<IpAddr>,
    pub fault_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalPort {
    pub uuid: String,
    pub gateway: GatewayId,
    pub name: String,
    pub physical_switch_id: String,
    pub fault_status: String,
}

/// Mapping of a VLAN on a physical port onto a logical switch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VlanBinding {
    pub port_uuid: String,
    pub logical_switch_id: String,
    pub gateway: GatewayId,
    pub vlan_id: u16,
}

/// Tunnel endpoint reachable at `destination_ip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalLocator {
    pub uuid: String,
    pub gateway: GatewayId,
    pub destination_ip: IpAddr,
}

/// MAC learned on one of the gateway's own ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UcastMacLocal {
    pub uuid: String,
    pub gateway: GatewayId,
    pub mac: MacAddress,
    pub logical_switch_id: String,
    pub locator_id: Option<String>,
    pub ip_address: Option<IpAddr>,
}

/// MAC reachable through a remote tunnel endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UcastMacRemote {
    pub uuid: String,
    pub gateway: GatewayId,
    pub mac: MacAddress,
    pub logical_switch_id: String,
    pub locator_id: String,
    pub ip_address: Option<IpAddr>,
}
