//! VtepSync - change-set dispatcher
//!
//! Routes every batch of a gateway change-set to its reconciler, runs the
//! locator cascade for deleted locators, then announces newly learned
//! remote MACs.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - CM-3: Configuration Change Control - Gateway change-sets applied in order
//! - SI-10: Information Input Validation - Malformed records rejected per item
//! - AU-12: Audit Record Generation - Per change-set summary logged

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::agent::{AgentDirectory, DEFAULT_AGENT_TYPE};
use crate::change_set::{ChangeBatch, ChangeSet};
use crate::error::Result;
use crate::l2pop::{L2Population, L2popStats};
use crate::notifier::Notifier;
use crate::reconciler::{Applied, Reconciler};
use crate::store::{Entity, EntityStore};
use crate::types::{GatewayId, UcastMacRemote};

/// Outcome of one change-set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub records: usize,
    /// Records dropped at decode time
    pub rejected: usize,
    pub applied: Applied,
    pub l2pop: L2popStats,
}

impl ProcessSummary {
    pub fn notifications(&self) -> usize {
        self.l2pop.added + self.l2pop.removed
    }
}

/// Running totals across change-sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VtepSyncStats {
    pub change_sets: u64,
    pub records: u64,
    pub records_rejected: u64,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub rows_deleted: u64,
    pub bindings_skipped: u64,
    pub fdb_added: u64,
    pub fdb_removed: u64,
    pub resolution_failures: u64,
}

impl VtepSyncStats {
    fn record(&mut self, summary: &ProcessSummary) {
        self.change_sets += 1;
        self.records += summary.records as u64;
        self.records_rejected += summary.rejected as u64;
        self.rows_inserted += summary.applied.inserted as u64;
        self.rows_updated += summary.applied.updated as u64;
        self.rows_deleted += summary.applied.deleted as u64;
        self.bindings_skipped += summary.applied.skipped as u64;
        self.fdb_added += summary.l2pop.added as u64;
        self.fdb_removed += summary.l2pop.removed as u64;
        self.resolution_failures += summary.l2pop.resolution_failures as u64;
    }
}

/// Change-set reconciliation engine.
///
/// Shared by reference across gateways; change-sets for one gateway must be
/// fed in order by the caller.
pub struct VtepSync {
    reconciler: Reconciler,
    l2pop: L2Population,
    stats: Mutex<VtepSyncStats>,
}

impl VtepSync {
    pub fn new(
        store: Arc<dyn EntityStore>,
        agents: Arc<dyn AgentDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_agent_type(store, agents, notifier, DEFAULT_AGENT_TYPE)
    }

    pub fn with_agent_type(
        store: Arc<dyn EntityStore>,
        agents: Arc<dyn AgentDirectory>,
        notifier: Arc<dyn Notifier>,
        agent_type: impl Into<String>,
    ) -> Self {
        let agent_type = agent_type.into();
        info!(agent_type = %agent_type, "VtepSync initialized");

        Self {
            reconciler: Reconciler::new(store.clone()),
            l2pop: L2Population::new(store, agents, notifier, agent_type),
            stats: Mutex::new(VtepSyncStats::default()),
        }
    }

    pub fn stats(&self) -> VtepSyncStats {
        self.stats.lock().clone()
    }

    /// Apply one change-set reported by `gateway`.
    ///
    /// Collaborator failures abort the change-set and are returned; every
    /// step is idempotent so the caller may replay it. Remote MACs whose
    /// tunnel endpoints cannot be resolved are skipped and counted.
    #[instrument(skip_all, fields(gateway = %gateway))]
    pub async fn process(&self, gateway: &GatewayId, changes: ChangeSet) -> Result<ProcessSummary> {
        let new_remote_macs: Option<Vec<UcastMacRemote>> = changes
            .new_remote_macs
            .as_ref()
            .map(|records| records.iter().map(|r| r.stamp(gateway)).collect());

        let mut summary = ProcessSummary {
            rejected: changes.rejected.len(),
            ..ProcessSummary::default()
        };
        for batch in changes.into_batches() {
            debug!(tag = batch.tag(), count = batch.len(), "Applying batch");
            summary.records += batch.len();
            self.apply(gateway, batch, &mut summary).await?;
        }

        if let Some(macs) = new_remote_macs.filter(|macs| !macs.is_empty()) {
            summary.l2pop += self.l2pop.sync_remote_macs(gateway, &macs).await?;
        }

        self.stats.lock().record(&summary);
        info!(
            records = summary.records,
            rejected = summary.rejected,
            inserted = summary.applied.inserted,
            updated = summary.applied.updated,
            deleted = summary.applied.deleted,
            fdb_added = summary.l2pop.added,
            fdb_removed = summary.l2pop.removed,
            unresolved = summary.l2pop.resolution_failures,
            "Processed change-set"
        );
        Ok(summary)
    }

    async fn apply(
        &self,
        gateway: &GatewayId,
        batch: ChangeBatch,
        summary: &mut ProcessSummary,
    ) -> Result<()> {
        let reconciler = &self.reconciler;

        match batch {
            ChangeBatch::NewLogicalSwitches(records) => {
                for record in records {
                    summary.applied += reconciler.add_logical_switch(record.stamp(gateway)).await?;
                }
            }
            ChangeBatch::NewPhysicalSwitches(records) => {
                for record in records {
                    summary.applied += reconciler.add_physical_switch(record.stamp(gateway)).await?;
                }
            }
            ChangeBatch::NewPhysicalPorts(records) => {
                for record in records {
                    summary.applied += reconciler
                        .add_physical_port(record.stamp(gateway), record.stamp_bindings(gateway))
                        .await?;
                }
            }
            ChangeBatch::NewPhysicalLocators(records) => {
                for record in records {
                    summary.applied += reconciler.add_physical_locator(record.stamp(gateway)).await?;
                }
            }
            ChangeBatch::NewLocalMacs(records) => {
                for record in records {
                    summary.applied += reconciler.add_local_mac(record.stamp(gateway)).await?;
                }
            }
            ChangeBatch::NewRemoteMacs(records) => {
                for record in records {
                    summary.applied += reconciler.add_remote_mac(record.stamp(gateway)).await?;
                }
            }
            ChangeBatch::ModifiedPhysicalPorts(records) => {
                for record in records {
                    summary.applied += reconciler
                        .modify_physical_port(record.stamp(gateway), record.stamp_bindings(gateway))
                        .await?;
                }
            }
            ChangeBatch::ModifiedPhysicalSwitches(records) => {
                for record in records {
                    summary.applied += reconciler.modify_physical_switch(record.stamp(gateway)).await?;
                }
            }
            ChangeBatch::DeletedLogicalSwitches(records) => {
                for record in records {
                    summary.applied += reconciler.delete_logical_switch(&record.key(gateway)).await?;
                }
            }
            ChangeBatch::DeletedPhysicalSwitches(records) => {
                for record in records {
                    summary.applied += reconciler.delete_physical_switch(&record.key(gateway)).await?;
                }
            }
            ChangeBatch::DeletedPhysicalPorts(records) => {
                for record in records {
                    summary.applied += reconciler.delete_physical_port(&record.key(gateway)).await?;
                }
            }
            ChangeBatch::DeletedPhysicalLocators(records) => {
                if records.is_empty() {
                    return Ok(());
                }
                let cascade = self.l2pop.locator_cascade(gateway).await?;
                for record in records {
                    let locator = record.stamp(gateway);
                    summary.l2pop += self.l2pop.withdraw_locator(&cascade, &locator).await?;
                    summary.applied += reconciler.delete_physical_locator(&locator.key()).await?;
                }
            }
            ChangeBatch::DeletedLocalMacs(records) => {
                for record in records {
                    summary.applied += reconciler.delete_local_mac(&record.key(gateway)).await?;
                }
            }
            ChangeBatch::DeletedRemoteMacs(records) => {
                for record in records {
                    summary.applied += reconciler.delete_remote_mac(&record.key(gateway)).await?;
                }
            }
        }

        Ok(())
    }
}
