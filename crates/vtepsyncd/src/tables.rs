//! Table and field name constants for vtepsyncd

use crate::store::Table;

// Gateway entity tables (hardware VTEP database)
pub const HWVTEP_LOGICAL_SWITCH_TABLE: &str = "HWVTEP_LOGICAL_SWITCH";
pub const HWVTEP_PHYSICAL_SWITCH_TABLE: &str = "HWVTEP_PHYSICAL_SWITCH";
pub const HWVTEP_PHYSICAL_PORT_TABLE: &str = "HWVTEP_PHYSICAL_PORT";
pub const HWVTEP_VLAN_BINDING_TABLE: &str = "HWVTEP_VLAN_BINDING";
pub const HWVTEP_PHYSICAL_LOCATOR_TABLE: &str = "HWVTEP_PHYSICAL_LOCATOR";
pub const HWVTEP_UCAST_MAC_LOCAL_TABLE: &str = "HWVTEP_UCAST_MAC_LOCAL";
pub const HWVTEP_UCAST_MAC_REMOTE_TABLE: &str = "HWVTEP_UCAST_MAC_REMOTE";

/// Overlay agent registry
pub const OVERLAY_AGENT_TABLE: &str = "OVERLAY_AGENT";

/// Key separator, matching the SONiC DB convention
pub const KEY_SEPARATOR: char = '|';

/// Escape glob metacharacters so `s` matches itself in a `KEYS` pattern
pub fn glob_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn table_name(table: Table) -> &'static str {
    match table {
        Table::LogicalSwitch => HWVTEP_LOGICAL_SWITCH_TABLE,
        Table::PhysicalSwitch => HWVTEP_PHYSICAL_SWITCH_TABLE,
        Table::PhysicalPort => HWVTEP_PHYSICAL_PORT_TABLE,
        Table::VlanBinding => HWVTEP_VLAN_BINDING_TABLE,
        Table::PhysicalLocator => HWVTEP_PHYSICAL_LOCATOR_TABLE,
        Table::UcastMacLocal => HWVTEP_UCAST_MAC_LOCAL_TABLE,
        Table::UcastMacRemote => HWVTEP_UCAST_MAC_REMOTE_TABLE,
    }
}

/// Entity row fields
pub mod entity_fields {
    pub const UUID: &str = "uuid";
    pub const NAME: &str = "name";
    pub const SEGMENT_KEY: &str = "segment_key";
    pub const TUNNEL_IP: &str = "tunnel_ip";
    pub const FAULT_STATUS: &str = "fault_status";
    pub const PHYSICAL_SWITCH_ID: &str = "physical_switch_id";
    pub const PORT_UUID: &str = "port_uuid";
    pub const LOGICAL_SWITCH_ID: &str = "logical_switch_id";
    pub const VLAN_ID: &str = "vlan_id";
    pub const DESTINATION_IP: &str = "destination_ip";
    pub const MAC: &str = "mac";
    pub const LOCATOR_ID: &str = "locator_id";
    pub const IP_ADDRESS: &str = "ip_address";
}

/// OVERLAY_AGENT table fields
pub mod agent_fields {
    pub const AGENT_TYPE: &str = "agent_type";
    pub const HOST: &str = "host";
    pub const TUNNELING_IP: &str = "tunneling_ip";
}

/// L2 population notification methods
pub mod l2pop_methods {
    pub const ADD_FDB_ENTRIES: &str = "add_fdb_entries";
    pub const REMOVE_FDB_ENTRIES: &str = "remove_fdb_entries";
}
