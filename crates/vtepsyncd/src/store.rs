//! Entity store abstraction
//!
//! The store offers keyed CRUD per [`Table`], scoped by gateway id, with
//! at-most-one row per natural key. Cascading deletes are not the store's
//! job; the reconcilers issue them explicitly.

use async_trait::async_trait;
use std::fmt;

use crate::error::{Result, VtepSyncError};
use crate::types::{
    GatewayId, LogicalSwitch, PhysicalLocator, PhysicalPort, PhysicalSwitch, UcastMacLocal,
    UcastMacRemote, VlanBinding,
};

/// Entity tables of the hardware VTEP schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    LogicalSwitch,
    PhysicalSwitch,
    PhysicalPort,
    VlanBinding,
    PhysicalLocator,
    UcastMacLocal,
    UcastMacRemote,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::LogicalSwitch => "logical_switch",
            Table::PhysicalSwitch => "physical_switch",
            Table::PhysicalPort => "physical_port",
            Table::VlanBinding => "vlan_binding",
            Table::PhysicalLocator => "physical_locator",
            Table::UcastMacLocal => "ucast_mac_local",
            Table::UcastMacRemote => "ucast_mac_remote",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural key of a row: the owning gateway plus the row id.
///
/// VLAN bindings have no uuid of their own; their id is
/// `<port_uuid>|<logical_switch_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub gateway: GatewayId,
    pub id: String,
}

impl NaturalKey {
    pub fn new(gateway: &GatewayId, id: impl Into<String>) -> Self {
        Self {
            gateway: gateway.clone(),
            id: id.into(),
        }
    }

    pub fn vlan_binding(gateway: &GatewayId, port_uuid: &str, logical_switch_id: &str) -> Self {
        Self::new(gateway, format!("{}|{}", port_uuid, logical_switch_id))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.gateway, self.id)
    }
}

/// A stored row of any table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    LogicalSwitch(LogicalSwitch),
    PhysicalSwitch(PhysicalSwitch),
    PhysicalPort(PhysicalPort),
    VlanBinding(VlanBinding),
    PhysicalLocator(PhysicalLocator),
    UcastMacLocal(UcastMacLocal),
    UcastMacRemote(UcastMacRemote),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Row::LogicalSwitch(_) => Table::LogicalSwitch,
            Row::PhysicalSwitch(_) => Table::PhysicalSwitch,
            Row::PhysicalPort(_) => Table::PhysicalPort,
            Row::VlanBinding(_) => Table::VlanBinding,
            Row::PhysicalLocator(_) => Table::PhysicalLocator,
            Row::UcastMacLocal(_) => Table::UcastMacLocal,
            Row::UcastMacRemote(_) => Table::UcastMacRemote,
        }
    }

    pub fn key(&self) -> NaturalKey {
        match self {
            Row::LogicalSwitch(e) => e.key(),
            Row::PhysicalSwitch(e) => e.key(),
            Row::PhysicalPort(e) => e.key(),
            Row::VlanBinding(e) => e.key(),
            Row::PhysicalLocator(e) => e.key(),
            Row::UcastMacLocal(e) => e.key(),
            Row::UcastMacRemote(e) => e.key(),
        }
    }
}

/// Typed view over one table
pub trait Entity: Clone + Send + Sync + Sized + 'static {
    const TABLE: Table;

    fn key(&self) -> NaturalKey;

    fn into_row(self) -> Row;

    fn from_row(row: Row) -> Option<Self>;
}

macro_rules! uuid_entity {
    ($ty:ident) => {
        impl Entity for $ty {
            const TABLE: Table = Table::$ty;

            fn key(&self) -> NaturalKey {
                NaturalKey::new(&self.gateway, self.uuid.clone())
            }

            fn into_row(self) -> Row {
                Row::$ty(self)
            }

            fn from_row(row: Row) -> Option<Self> {
                match row {
                    Row::$ty(e) => Some(e),
                    _ => None,
                }
            }
        }
    };
}

uuid_entity!(LogicalSwitch);
uuid_entity!(PhysicalSwitch);
uuid_entity!(PhysicalPort);
uuid_entity!(PhysicalLocator);
uuid_entity!(UcastMacLocal);
uuid_entity!(UcastMacRemote);

impl Entity for VlanBinding {
    const TABLE: Table = Table::VlanBinding;

    fn key(&self) -> NaturalKey {
        NaturalKey::vlan_binding(&self.gateway, &self.port_uuid, &self.logical_switch_id)
    }

    fn into_row(self) -> Row {
        Row::VlanBinding(self)
    }

    fn from_row(row: Row) -> Option<Self> {
        match row {
            Row::VlanBinding(e) => Some(e),
            _ => None,
        }
    }
}

/// Keyed CRUD over the gateway entity tables.
///
/// Implementations must make each call atomic per natural key; two
/// concurrent `insert` calls for the same key leave exactly one row.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, table: Table, key: &NaturalKey) -> Result<Option<Row>>;

    /// Insert the row unless one with the same key exists. Returns whether it was inserted.
    async fn insert(&self, row: Row) -> Result<bool>;

    /// Replace an existing row. Returns false if no row had the key.
    async fn update(&self, row: Row) -> Result<bool>;

    /// Delete by key. Returns false if no row had the key.
    async fn delete(&self, table: Table, key: &NaturalKey) -> Result<bool>;

    /// All rows of a table under one gateway
    async fn scan(&self, table: Table, gateway: &GatewayId) -> Result<Vec<Row>>;
}

fn wrong_table<E: Entity>(key: &NaturalKey, found: Table) -> VtepSyncError {
    VtepSyncError::store(format!(
        "expected {} row under {}, found {}",
        E::TABLE,
        key,
        found
    ))
}

fn downcast<E: Entity>(row: Row) -> Result<E> {
    let (table, key) = (row.table(), row.key());
    E::from_row(row).ok_or_else(|| wrong_table::<E>(&key, table))
}

pub async fn fetch<E: Entity>(store: &dyn EntityStore, key: &NaturalKey) -> Result<Option<E>> {
    store.get(E::TABLE, key).await?.map(downcast).transpose()
}

pub async fn fetch_all<E: Entity>(store: &dyn EntityStore, gateway: &GatewayId) -> Result<Vec<E>> {
    store
        .scan(E::TABLE, gateway)
        .await?
        .into_iter()
        .map(downcast)
        .collect()
}

async fn fetch_where<E, F>(store: &dyn EntityStore, gateway: &GatewayId, pred: F) -> Result<Vec<E>>
where
    E: Entity,
    F: Fn(&E) -> bool,
{
    Ok(fetch_all::<E>(store, gateway)
        .await?
        .into_iter()
        .filter(|e| pred(e))
        .collect())
}

pub async fn insert_if_absent<E: Entity>(store: &dyn EntityStore, entity: E) -> Result<bool> {
    store.insert(entity.into_row()).await
}

pub async fn delete_entity<E: Entity>(store: &dyn EntityStore, entity: &E) -> Result<bool> {
    store.delete(E::TABLE, &entity.key()).await
}

pub async fn bindings_of_port(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    port_uuid: &str,
) -> Result<Vec<VlanBinding>> {
    fetch_where(store, gateway, |b: &VlanBinding| b.port_uuid == port_uuid).await
}

pub async fn bindings_of_logical_switch(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    logical_switch_id: &str,
) -> Result<Vec<VlanBinding>> {
    fetch_where(store, gateway, |b: &VlanBinding| {
        b.logical_switch_id == logical_switch_id
    })
    .await
}

pub async fn ports_of_switch(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    physical_switch_id: &str,
) -> Result<Vec<PhysicalPort>> {
    fetch_where(store, gateway, |p: &PhysicalPort| {
        p.physical_switch_id == physical_switch_id
    })
    .await
}

pub async fn local_macs_of_logical_switch(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    logical_switch_id: &str,
) -> Result<Vec<UcastMacLocal>> {
    fetch_where(store, gateway, |m: &UcastMacLocal| {
        m.logical_switch_id == logical_switch_id
    })
    .await
}

pub async fn remote_macs_of_logical_switch(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    logical_switch_id: &str,
) -> Result<Vec<UcastMacRemote>> {
    fetch_where(store, gateway, |m: &UcastMacRemote| {
        m.logical_switch_id == logical_switch_id
    })
    .await
}

pub async fn local_macs_of_locator(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    locator_id: &str,
) -> Result<Vec<UcastMacLocal>> {
    fetch_where(store, gateway, |m: &UcastMacLocal| {
        m.locator_id.as_deref() == Some(locator_id)
    })
    .await
}

pub async fn remote_macs_of_locator(
    store: &dyn EntityStore,
    gateway: &GatewayId,
    locator_id: &str,
) -> Result<Vec<UcastMacRemote>> {
    fetch_where(store, gateway, |m: &UcastMacRemote| m.locator_id == locator_id).await
}
