//! Change-set wire records
//!
//! A change-set maps change-type tags (`new_logical_switches`,
//! `deleted_physical_locators`, ...) to lists of records as reported by the
//! gateway's OVSDB monitor. Records carry no gateway id; the dispatcher
//! stamps one on to derive the stored entity.
//!
//! Field names follow the VTEP schema column names, with the monitor's
//! shorthand accepted as aliases (`key`, `dst_ip`, `vlan`,
//! `logical_switch_uuid`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::NaturalKey;
use crate::types::{
    GatewayId, LogicalSwitch, MacAddress, PhysicalLocator, PhysicalPort, PhysicalSwitch,
    UcastMacLocal, UcastMacRemote, VlanBinding,
};

/// OVSDB encodes unset optional columns as `["set", []]`
#[derive(Deserialize)]
#[serde(untagged)]
enum OvsdbColumn {
    Text(String),
    Integer(u64),
    Set(String, Vec<Value>),
    Null,
}

impl OvsdbColumn {
    /// Collapse into the plain members of the column, integers as text
    fn into_strings(self) -> Vec<String> {
        match self {
            OvsdbColumn::Text(s) if s.is_empty() => Vec::new(),
            OvsdbColumn::Text(s) => vec![s],
            OvsdbColumn::Integer(n) => vec![n.to_string()],
            OvsdbColumn::Set(_, items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            OvsdbColumn::Null => Vec::new(),
        }
    }
}

/// First member of an optional column, parsed
fn optional_column<'de, D, T>(deserializer: D, what: &str) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let column = OvsdbColumn::deserialize(deserializer)?;
    match column.into_strings().into_iter().next() {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid {}: {}", what, s))),
        None => Ok(None),
    }
}

fn optional_ip<'de, D>(deserializer: D) -> std::result::Result<Option<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_column(deserializer, "IP address")
}

fn optional_key<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_column(deserializer, "tunnel key")
}

fn status_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(OvsdbColumn::deserialize(deserializer)?
        .into_strings()
        .join(","))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogicalSwitchRecord {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "key", default, deserialize_with = "optional_key")]
    pub segment_key: Option<u32>,
}

impl LogicalSwitchRecord {
    pub fn stamp(&self, gateway: &GatewayId) -> LogicalSwitch {
        LogicalSwitch {
            uuid: self.uuid.clone(),
            gateway: gateway.clone(),
            name: self.name.clone(),
            segment_key: self.segment_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhysicalSwitchRecord {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "optional_ip")]
    pub tunnel_ip: Option<IpAddr>,
    #[serde(
        default,
        alias = "switch_fault_status",
        deserialize_with = "status_text"
    )]
    pub fault_status: String,
}

impl PhysicalSwitchRecord {
    pub fn stamp(&self, gateway: &GatewayId) -> PhysicalSwitch {
        PhysicalSwitch {
            uuid: self.uuid.clone(),
            gateway: gateway.clone(),
            name: self.name.clone(),
            tunnel_ip: self.tunnel_ip,
            fault_status: self.fault_status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VlanBindingRecord {
    #[serde(alias = "logical_switch_uuid")]
    pub logical_switch_id: String,
    #[serde(alias = "vlan")]
    pub vlan_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhysicalPortRecord {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub physical_switch_id: String,
    #[serde(
        default,
        alias = "port_fault_status",
        deserialize_with = "status_text"
    )]
    pub fault_status: String,
    #[serde(default)]
    pub vlan_bindings: Vec<VlanBindingRecord>,
}

impl PhysicalPortRecord {
    pub fn stamp(&self, gateway: &GatewayId) -> PhysicalPort {
        PhysicalPort {
            uuid: self.uuid.clone(),
            gateway: gateway.clone(),
            name: self.name.clone(),
            physical_switch_id: self.physical_switch_id.clone(),
            fault_status: self.fault_status.clone(),
        }
    }

    /// The carried bindings, owned by this port
    pub fn stamp_bindings(&self, gateway: &GatewayId) -> Vec<VlanBinding> {
        self.vlan_bindings
            .iter()
            .map(|b| VlanBinding {
                port_uuid: self.uuid.clone(),
                logical_switch_id: b.logical_switch_id.clone(),
                gateway: gateway.clone(),
                vlan_id: b.vlan_id,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PhysicalLocatorRecord {
    pub uuid: String,
    #[serde(alias = "dst_ip")]
    pub destination_ip: IpAddr,
}

impl PhysicalLocatorRecord {
    pub fn stamp(&self, gateway: &GatewayId) -> PhysicalLocator {
        PhysicalLocator {
            uuid: self.uuid.clone(),
            gateway: gateway.clone(),
            destination_ip: self.destination_ip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UcastMacLocalRecord {
    pub uuid: String,
    pub mac: MacAddress,
    #[serde(alias = "logical_switch_uuid")]
    pub logical_switch_id: String,
    #[serde(default, alias = "physical_locator_id")]
    pub locator_id: Option<String>,
    #[serde(default, deserialize_with = "optional_ip")]
    pub ip_address: Option<IpAddr>,
}

impl UcastMacLocalRecord {
    pub fn stamp(&self, gateway: &GatewayId) -> UcastMacLocal {
        UcastMacLocal {
            uuid: self.uuid.clone(),
            gateway: gateway.clone(),
            mac: self.mac,
            logical_switch_id: self.logical_switch_id.clone(),
            locator_id: self.locator_id.clone(),
            ip_address: self.ip_address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UcastMacRemoteRecord {
    pub uuid: String,
    pub mac: MacAddress,
    #[serde(alias = "logical_switch_uuid")]
    pub logical_switch_id: String,
    #[serde(alias = "physical_locator_id")]
    pub locator_id: String,
    #[serde(default, deserialize_with = "optional_ip")]
    pub ip_address: Option<IpAddr>,
}

impl UcastMacRemoteRecord {
    pub fn stamp(&self, gateway: &GatewayId) -> UcastMacRemote {
        UcastMacRemote {
            uuid: self.uuid.clone(),
            gateway: gateway.clone(),
            mac: self.mac,
            logical_switch_id: self.logical_switch_id.clone(),
            locator_id: self.locator_id.clone(),
            ip_address: self.ip_address,
        }
    }
}

/// Deletion of a uuid-keyed row. Other columns are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeletedRecord {
    pub uuid: String,
}

impl DeletedRecord {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into() }
    }

    pub fn key(&self, gateway: &GatewayId) -> NaturalKey {
        NaturalKey::new(gateway, self.uuid.clone())
    }
}

/// One change-type tag and its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeBatch {
    NewLogicalSwitches(Vec<LogicalSwitchRecord>),
    NewPhysicalSwitches(Vec<PhysicalSwitchRecord>),
    NewPhysicalPorts(Vec<PhysicalPortRecord>),
    NewPhysicalLocators(Vec<PhysicalLocatorRecord>),
    NewLocalMacs(Vec<UcastMacLocalRecord>),
    NewRemoteMacs(Vec<UcastMacRemoteRecord>),
    ModifiedPhysicalPorts(Vec<PhysicalPortRecord>),
    ModifiedPhysicalSwitches(Vec<PhysicalSwitchRecord>),
    DeletedLogicalSwitches(Vec<DeletedRecord>),
    DeletedPhysicalSwitches(Vec<DeletedRecord>),
    DeletedPhysicalPorts(Vec<DeletedRecord>),
    DeletedPhysicalLocators(Vec<PhysicalLocatorRecord>),
    DeletedLocalMacs(Vec<DeletedRecord>),
    DeletedRemoteMacs(Vec<DeletedRecord>),
}

impl ChangeBatch {
    pub fn tag(&self) -> &'static str {
        match self {
            ChangeBatch::NewLogicalSwitches(_) => "new_logical_switches",
            ChangeBatch::NewPhysicalSwitches(_) => "new_physical_switches",
            ChangeBatch::NewPhysicalPorts(_) => "new_physical_ports",
            ChangeBatch::NewPhysicalLocators(_) => "new_physical_locators",
            ChangeBatch::NewLocalMacs(_) => "new_local_macs",
            ChangeBatch::NewRemoteMacs(_) => "new_remote_macs",
            ChangeBatch::ModifiedPhysicalPorts(_) => "modified_physical_ports",
            ChangeBatch::ModifiedPhysicalSwitches(_) => "modified_physical_switches",
            ChangeBatch::DeletedLogicalSwitches(_) => "deleted_logical_switches",
            ChangeBatch::DeletedPhysicalSwitches(_) => "deleted_physical_switches",
            ChangeBatch::DeletedPhysicalPorts(_) => "deleted_physical_ports",
            ChangeBatch::DeletedPhysicalLocators(_) => "deleted_physical_locators",
            ChangeBatch::DeletedLocalMacs(_) => "deleted_local_macs",
            ChangeBatch::DeletedRemoteMacs(_) => "deleted_remote_macs",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChangeBatch::NewLogicalSwitches(v) => v.len(),
            ChangeBatch::NewPhysicalSwitches(v) | ChangeBatch::ModifiedPhysicalSwitches(v) => {
                v.len()
            }
            ChangeBatch::NewPhysicalPorts(v) | ChangeBatch::ModifiedPhysicalPorts(v) => v.len(),
            ChangeBatch::NewPhysicalLocators(v) | ChangeBatch::DeletedPhysicalLocators(v) => {
                v.len()
            }
            ChangeBatch::NewLocalMacs(v) => v.len(),
            ChangeBatch::NewRemoteMacs(v) => v.len(),
            ChangeBatch::DeletedLogicalSwitches(v)
            | ChangeBatch::DeletedPhysicalSwitches(v)
            | ChangeBatch::DeletedPhysicalPorts(v)
            | ChangeBatch::DeletedLocalMacs(v)
            | ChangeBatch::DeletedRemoteMacs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A record dropped while decoding a change-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub tag: &'static str,
    pub uuid: Option<String>,
    pub reason: String,
}

/// A full change-set as reported for one gateway.
///
/// Absent tags stay `None`. Tags this daemon does not know are kept in
/// `unknown` only so they can be logged; they are never applied. Records
/// are decoded one at a time: a malformed record lands in `rejected` and
/// the rest of its tag still applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub new_logical_switches: Option<Vec<LogicalSwitchRecord>>,
    pub new_physical_switches: Option<Vec<PhysicalSwitchRecord>>,
    pub new_physical_ports: Option<Vec<PhysicalPortRecord>>,
    pub new_physical_locators: Option<Vec<PhysicalLocatorRecord>>,
    pub new_local_macs: Option<Vec<UcastMacLocalRecord>>,
    pub new_remote_macs: Option<Vec<UcastMacRemoteRecord>>,
    pub modified_physical_ports: Option<Vec<PhysicalPortRecord>>,
    pub modified_physical_switches: Option<Vec<PhysicalSwitchRecord>>,
    pub deleted_logical_switches: Option<Vec<DeletedRecord>>,
    pub deleted_physical_switches: Option<Vec<DeletedRecord>>,
    pub deleted_physical_ports: Option<Vec<DeletedRecord>>,
    pub deleted_physical_locators: Option<Vec<PhysicalLocatorRecord>>,
    pub deleted_local_macs: Option<Vec<DeletedRecord>>,
    pub deleted_remote_macs: Option<Vec<DeletedRecord>>,
    pub unknown: BTreeMap<String, Value>,
    pub rejected: Vec<RejectedRecord>,
}

/// Tag-by-tag decoder over the raw change-set object
struct RecordDecoder {
    raw: BTreeMap<String, Value>,
    rejected: Vec<RejectedRecord>,
}

impl RecordDecoder {
    fn take<T: DeserializeOwned>(&mut self, tag: &'static str) -> std::result::Result<Option<Vec<T>>, String> {
        let items = match self.raw.remove(tag) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(format!("{}: expected a list of records", tag)),
        };

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let uuid = item.get("uuid").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value(item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(tag, uuid = ?uuid, error = %e, "Rejecting undecodable record");
                    self.rejected.push(RejectedRecord {
                        tag,
                        uuid,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(Some(records))
    }
}

impl<'de> Deserialize<'de> for ChangeSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut d = RecordDecoder {
            raw,
            rejected: Vec::new(),
        };

        let mut changes = ChangeSet {
            new_logical_switches: d.take("new_logical_switches").map_err(D::Error::custom)?,
            new_physical_switches: d.take("new_physical_switches").map_err(D::Error::custom)?,
            new_physical_ports: d.take("new_physical_ports").map_err(D::Error::custom)?,
            new_physical_locators: d.take("new_physical_locators").map_err(D::Error::custom)?,
            new_local_macs: d.take("new_local_macs").map_err(D::Error::custom)?,
            new_remote_macs: d.take("new_remote_macs").map_err(D::Error::custom)?,
            modified_physical_ports: d.take("modified_physical_ports").map_err(D::Error::custom)?,
            modified_physical_switches: d
                .take("modified_physical_switches")
                .map_err(D::Error::custom)?,
            deleted_logical_switches: d.take("deleted_logical_switches").map_err(D::Error::custom)?,
            deleted_physical_switches: d
                .take("deleted_physical_switches")
                .map_err(D::Error::custom)?,
            deleted_physical_ports: d.take("deleted_physical_ports").map_err(D::Error::custom)?,
            deleted_physical_locators: d
                .take("deleted_physical_locators")
                .map_err(D::Error::custom)?,
            deleted_local_macs: d.take("deleted_local_macs").map_err(D::Error::custom)?,
            deleted_remote_macs: d.take("deleted_remote_macs").map_err(D::Error::custom)?,
            ..ChangeSet::default()
        };
        changes.unknown = d.raw;
        changes.rejected = d.rejected;
        Ok(changes)
    }
}

impl ChangeSet {
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Split into batches in application order.
    ///
    /// Creations run parents first, then modifications, then deletions
    /// children first, so locator cascades still see the logical switches
    /// deleted in the same change-set.
    pub fn into_batches(self) -> Vec<ChangeBatch> {
        for tag in self.unknown.keys() {
            debug!(tag = %tag, "Ignoring unknown change-set tag");
        }

        let batches = [
            self.new_logical_switches.map(ChangeBatch::NewLogicalSwitches),
            self.new_physical_switches.map(ChangeBatch::NewPhysicalSwitches),
            self.new_physical_locators.map(ChangeBatch::NewPhysicalLocators),
            self.new_physical_ports.map(ChangeBatch::NewPhysicalPorts),
            self.new_local_macs.map(ChangeBatch::NewLocalMacs),
            self.new_remote_macs.map(ChangeBatch::NewRemoteMacs),
            self.modified_physical_switches
                .map(ChangeBatch::ModifiedPhysicalSwitches),
            self.modified_physical_ports.map(ChangeBatch::ModifiedPhysicalPorts),
            self.deleted_remote_macs.map(ChangeBatch::DeletedRemoteMacs),
            self.deleted_local_macs.map(ChangeBatch::DeletedLocalMacs),
            self.deleted_physical_locators
                .map(ChangeBatch::DeletedPhysicalLocators),
            self.deleted_physical_ports.map(ChangeBatch::DeletedPhysicalPorts),
            self.deleted_physical_switches
                .map(ChangeBatch::DeletedPhysicalSwitches),
            self.deleted_logical_switches
                .map(ChangeBatch::DeletedLogicalSwitches),
        ];

        batches.into_iter().flatten().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clone().into_batches().iter().all(ChangeBatch::is_empty)
    }
}

/// Queue message: a change-set tagged with the reporting gateway
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChangeMessage {
    pub ovsdb_identifier: GatewayId,
    #[serde(flatten)]
    pub changes: ChangeSet,
}

impl ChangeMessage {
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
