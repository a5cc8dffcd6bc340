//! In-memory entity store
//!
//! Backs dry runs and tests. Every call takes the table lock once, so each
//! operation is atomic per natural key.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::store::{EntityStore, NaturalKey, Row, Table};
use crate::types::GatewayId;

pub type Snapshot = BTreeMap<(Table, NaturalKey), Row>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored row, ordered by table then key
    pub fn snapshot(&self) -> Snapshot {
        self.rows.read().clone()
    }

    /// Rows belonging to one gateway
    pub fn snapshot_gateway(&self, gateway: &GatewayId) -> Snapshot {
        self.rows
            .read()
            .iter()
            .filter(|((_, key), _)| &key.gateway == gateway)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn count(&self, table: Table) -> usize {
        self.rows.read().keys().filter(|(t, _)| *t == table).count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, table: Table, key: &NaturalKey) -> Result<Option<Row>> {
        Ok(self.rows.read().get(&(table, key.clone())).cloned())
    }

    async fn insert(&self, row: Row) -> Result<bool> {
        let mut rows = self.rows.write();
        let slot = (row.table(), row.key());
        if rows.contains_key(&slot) {
            return Ok(false);
        }
        rows.insert(slot, row);
        Ok(true)
    }

    async fn update(&self, row: Row) -> Result<bool> {
        let mut rows = self.rows.write();
        match rows.get_mut(&(row.table(), row.key())) {
            Some(existing) => {
                *existing = row;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, table: Table, key: &NaturalKey) -> Result<bool> {
        Ok(self.rows.write().remove(&(table, key.clone())).is_some())
    }

    async fn scan(&self, table: Table, gateway: &GatewayId) -> Result<Vec<Row>> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|((t, key), _)| *t == table && &key.gateway == gateway)
            .map(|(_, row)| row.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fetch, fetch_all, Entity};
    use crate::types::LogicalSwitch;
    use pretty_assertions::assert_eq;

    fn ls(gateway: &str, uuid: &str, name: &str) -> LogicalSwitch {
        LogicalSwitch {
            uuid: uuid.into(),
            gateway: GatewayId::new(gateway).unwrap(),
            name: name.into(),
            segment_key: Some(100),
        }
    }

    #[tokio::test]
    async fn test_insert_is_at_most_once() {
        let store = MemoryStore::new();
        assert!(store.insert(ls("gw1", "ls-1", "a").into_row()).await.unwrap());
        assert!(!store.insert(ls("gw1", "ls-1", "b").into_row()).await.unwrap());

        let stored: LogicalSwitch = fetch(&store, &ls("gw1", "ls-1", "").key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "a");
        assert_eq!(store.count(Table::LogicalSwitch), 1);
    }

    #[tokio::test]
    async fn test_same_uuid_in_two_gateways() {
        let store = MemoryStore::new();
        store.insert(ls("gw1", "ls-1", "a").into_row()).await.unwrap();
        store.insert(ls("gw2", "ls-1", "b").into_row()).await.unwrap();

        let gw1: Vec<LogicalSwitch> = fetch_all(&store, &GatewayId::new("gw1").unwrap()).await.unwrap();
        assert_eq!(gw1, vec![ls("gw1", "ls-1", "a")]);
        assert_eq!(store.snapshot_gateway(&GatewayId::new("gw2").unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let store = MemoryStore::new();
        assert!(!store.update(ls("gw1", "ls-1", "a").into_row()).await.unwrap());
        assert!(!store
            .delete(Table::LogicalSwitch, &ls("gw1", "ls-1", "").key())
            .await
            .unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_row() {
        let store = MemoryStore::new();
        store.insert(ls("gw1", "ls-1", "a").into_row()).await.unwrap();
        assert!(store.update(ls("gw1", "ls-1", "z").into_row()).await.unwrap());

        let stored: Option<LogicalSwitch> =
            fetch(&store, &ls("gw1", "ls-1", "").key()).await.unwrap();
        assert_eq!(stored.map(|s| s.name), Some("z".to_string()));
    }
}
