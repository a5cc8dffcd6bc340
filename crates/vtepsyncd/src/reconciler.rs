//! Per-entity reconciliation against the entity store
//!
//! Every routine is idempotent: re-delivering a creation leaves the stored
//! row untouched and deleting a missing row is a no-op. Deletes cascade to
//! the rows that reference the deleted one.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-3: Configuration Change Control - Idempotent create, modify and delete
//! - SI-7: Software, Firmware, and Information Integrity - Cascading deletes keep references consistent

use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::{
    bindings_of_logical_switch, bindings_of_port, delete_entity, fetch, insert_if_absent,
    local_macs_of_locator, local_macs_of_logical_switch, ports_of_switch,
    remote_macs_of_locator, remote_macs_of_logical_switch, Entity, EntityStore, NaturalKey,
};
use crate::types::{
    LogicalSwitch, PhysicalLocator, PhysicalPort, PhysicalSwitch, UcastMacLocal, UcastMacRemote,
    VlanBinding,
};

/// Rows touched by one reconciliation call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Bindings dropped because their logical switch is unknown
    pub skipped: usize,
}

impl Applied {
    fn inserted(yes: bool) -> Self {
        Self {
            inserted: usize::from(yes),
            ..Self::default()
        }
    }

    fn deleted(yes: bool) -> Self {
        Self {
            deleted: usize::from(yes),
            ..Self::default()
        }
    }
}

impl AddAssign for Applied {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.deleted += rhs.deleted;
        self.skipped += rhs.skipped;
    }
}

/// Upsert/delete routines, one per entity type
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EntityStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    async fn add<E: Entity>(&self, entity: E) -> Result<Applied> {
        let key = entity.key();
        let inserted = insert_if_absent(self.store(), entity).await?;
        if !inserted {
            debug!(table = %E::TABLE, key = %key, "Row already present");
        }
        Ok(Applied::inserted(inserted))
    }

    async fn remove<E: Entity>(&self, entity: &E) -> Result<Applied> {
        Ok(Applied::deleted(delete_entity(self.store(), entity).await?))
    }

    pub async fn add_logical_switch(&self, logical_switch: LogicalSwitch) -> Result<Applied> {
        self.add(logical_switch).await
    }

    pub async fn add_physical_switch(&self, switch: PhysicalSwitch) -> Result<Applied> {
        self.add(switch).await
    }

    pub async fn add_physical_locator(&self, locator: PhysicalLocator) -> Result<Applied> {
        self.add(locator).await
    }

    pub async fn add_local_mac(&self, mac: UcastMacLocal) -> Result<Applied> {
        self.add(mac).await
    }

    pub async fn add_remote_mac(&self, mac: UcastMacRemote) -> Result<Applied> {
        self.add(mac).await
    }

    /// Insert the port if absent, then each binding if absent
    pub async fn add_physical_port(
        &self,
        port: PhysicalPort,
        bindings: Vec<VlanBinding>,
    ) -> Result<Applied> {
        let mut applied = self.add(port).await?;
        for binding in bindings {
            applied += self.add_binding(binding).await?;
        }
        Ok(applied)
    }

    /// Bindings must point at a known logical switch of the same gateway
    async fn add_binding(&self, binding: VlanBinding) -> Result<Applied> {
        let ls_key = NaturalKey::new(&binding.gateway, binding.logical_switch_id.clone());
        if fetch::<LogicalSwitch>(self.store(), &ls_key).await?.is_none() {
            warn!(
                port = %binding.port_uuid,
                logical_switch = %binding.logical_switch_id,
                vlan = binding.vlan_id,
                "Skipping VLAN binding to unknown logical switch"
            );
            return Ok(Applied {
                skipped: 1,
                ..Applied::default()
            });
        }
        self.add(binding).await
    }

    /// Update port status and replace its whole binding set.
    ///
    /// An unknown port is created with its bindings instead.
    pub async fn modify_physical_port(
        &self,
        port: PhysicalPort,
        bindings: Vec<VlanBinding>,
    ) -> Result<Applied> {
        let existing: Option<PhysicalPort> = fetch(self.store(), &port.key()).await?;
        let Some(existing) = existing else {
            info!(
                gateway = %port.gateway,
                port = %port.uuid,
                "Modification for unknown physical port, creating it"
            );
            return self.add_physical_port(port, bindings).await;
        };

        let mut applied = Applied::default();
        if existing.fault_status != port.fault_status {
            let updated = PhysicalPort {
                fault_status: port.fault_status.clone(),
                ..existing
            };
            if self.store().update(updated.into_row()).await? {
                applied.updated += 1;
            }
        }

        for stale in bindings_of_port(self.store(), &port.gateway, &port.uuid).await? {
            applied += self.remove(&stale).await?;
        }
        for binding in bindings {
            applied += self.add_binding(binding).await?;
        }

        debug!(port = %port.uuid, ?applied, "Replaced VLAN bindings");
        Ok(applied)
    }

    /// Update switch status only. Unknown switches are not created.
    pub async fn modify_physical_switch(&self, switch: PhysicalSwitch) -> Result<Applied> {
        let existing: Option<PhysicalSwitch> = fetch(self.store(), &switch.key()).await?;
        let Some(existing) = existing else {
            debug!(switch = %switch.uuid, "Modification for unknown physical switch ignored");
            return Ok(Applied::default());
        };

        if existing.fault_status == switch.fault_status {
            return Ok(Applied::default());
        }

        let updated = PhysicalSwitch {
            fault_status: switch.fault_status,
            ..existing
        };
        let mut applied = Applied::default();
        if self.store().update(updated.into_row()).await? {
            applied.updated += 1;
        }
        Ok(applied)
    }

    /// Delete a port and its VLAN bindings
    pub async fn delete_physical_port(&self, key: &NaturalKey) -> Result<Applied> {
        let mut applied = Applied::default();
        for binding in bindings_of_port(self.store(), &key.gateway, &key.id).await? {
            applied += self.remove(&binding).await?;
        }
        applied += Applied::deleted(self.store().delete(PhysicalPort::TABLE, key).await?);
        Ok(applied)
    }

    /// Delete a switch, its ports and their bindings
    pub async fn delete_physical_switch(&self, key: &NaturalKey) -> Result<Applied> {
        let mut applied = Applied::default();
        for port in ports_of_switch(self.store(), &key.gateway, &key.id).await? {
            applied += self.delete_physical_port(&port.key()).await?;
        }
        applied += Applied::deleted(self.store().delete(PhysicalSwitch::TABLE, key).await?);
        Ok(applied)
    }

    /// Delete a logical switch with the bindings and MACs in it
    pub async fn delete_logical_switch(&self, key: &NaturalKey) -> Result<Applied> {
        let mut applied = Applied::default();
        for binding in bindings_of_logical_switch(self.store(), &key.gateway, &key.id).await? {
            applied += self.remove(&binding).await?;
        }
        for mac in local_macs_of_logical_switch(self.store(), &key.gateway, &key.id).await? {
            applied += self.remove(&mac).await?;
        }
        for mac in remote_macs_of_logical_switch(self.store(), &key.gateway, &key.id).await? {
            applied += self.remove(&mac).await?;
        }
        applied += Applied::deleted(self.store().delete(LogicalSwitch::TABLE, key).await?);
        Ok(applied)
    }

    /// Delete a locator with the MACs reached through it
    pub async fn delete_physical_locator(&self, key: &NaturalKey) -> Result<Applied> {
        let mut applied = Applied::default();
        for mac in remote_macs_of_locator(self.store(), &key.gateway, &key.id).await? {
            applied += self.remove(&mac).await?;
        }
        for mac in local_macs_of_locator(self.store(), &key.gateway, &key.id).await? {
            applied += self.remove(&mac).await?;
        }
        applied += Applied::deleted(self.store().delete(PhysicalLocator::TABLE, key).await?);
        Ok(applied)
    }

    pub async fn delete_local_mac(&self, key: &NaturalKey) -> Result<Applied> {
        Ok(Applied::deleted(
            self.store().delete(UcastMacLocal::TABLE, key).await?,
        ))
    }

    pub async fn delete_remote_mac(&self, key: &NaturalKey) -> Result<Applied> {
        Ok(Applied::deleted(
            self.store().delete(UcastMacRemote::TABLE, key).await?,
        ))
    }
}
