//! Redis-backed entity store
//!
//! Each row is a hash at `<TABLE>|<gateway>|<id>`. Inserts create the whole
//! hash in one scripted step that first checks the key, which keeps inserts
//! at most once per key and never leaves a row without its fields.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SC-8: Transmission Confidentiality - Database communication
//! - AC-4: Information Flow Enforcement - Keys and scans scoped per gateway

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::error::{Result, VtepSyncError};
use crate::redis_adapter::RedisAdapter;
use crate::store::{EntityStore, NaturalKey, Row, Table};
use crate::tables::{entity_fields as f, glob_escape, table_name, KEY_SEPARATOR};
use crate::types::{
    GatewayId, LogicalSwitch, PhysicalLocator, PhysicalPort, PhysicalSwitch, UcastMacLocal,
    UcastMacRemote, VlanBinding,
};

pub fn redis_key(table: Table, key: &NaturalKey) -> String {
    format!(
        "{}{}{}{}{}",
        table_name(table),
        KEY_SEPARATOR,
        key.gateway,
        KEY_SEPARATOR,
        key.id
    )
}

/// `KEYS` pattern matching every row of `gateway` in `table`
pub fn scan_pattern(table: Table, gateway: &GatewayId) -> String {
    format!(
        "{}{}{}{}*",
        glob_escape(table_name(table)),
        KEY_SEPARATOR,
        glob_escape(gateway.as_str()),
        KEY_SEPARATOR
    )
}

fn opt_text<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// Field/value pairs for a row, `uuid` first
pub fn to_field_values(row: &Row) -> Vec<(&'static str, String)> {
    let mut fields = vec![(f::UUID, row.key().id)];
    match row {
        Row::LogicalSwitch(ls) => {
            fields.push((f::NAME, ls.name.clone()));
            fields.push((f::SEGMENT_KEY, opt_text(&ls.segment_key)));
        }
        Row::PhysicalSwitch(ps) => {
            fields.push((f::NAME, ps.name.clone()));
            fields.push((f::TUNNEL_IP, opt_text(&ps.tunnel_ip)));
            fields.push((f::FAULT_STATUS, ps.fault_status.clone()));
        }
        Row::PhysicalPort(pp) => {
            fields.push((f::NAME, pp.name.clone()));
            fields.push((f::PHYSICAL_SWITCH_ID, pp.physical_switch_id.clone()));
            fields.push((f::FAULT_STATUS, pp.fault_status.clone()));
        }
        Row::VlanBinding(vb) => {
            fields.push((f::PORT_UUID, vb.port_uuid.clone()));
            fields.push((f::LOGICAL_SWITCH_ID, vb.logical_switch_id.clone()));
            fields.push((f::VLAN_ID, vb.vlan_id.to_string()));
        }
        Row::PhysicalLocator(pl) => {
            fields.push((f::DESTINATION_IP, pl.destination_ip.to_string()));
        }
        Row::UcastMacLocal(m) => {
            fields.push((f::MAC, m.mac.to_string()));
            fields.push((f::LOGICAL_SWITCH_ID, m.logical_switch_id.clone()));
            fields.push((f::LOCATOR_ID, opt_text(&m.locator_id)));
            fields.push((f::IP_ADDRESS, opt_text(&m.ip_address)));
        }
        Row::UcastMacRemote(m) => {
            fields.push((f::MAC, m.mac.to_string()));
            fields.push((f::LOGICAL_SWITCH_ID, m.logical_switch_id.clone()));
            fields.push((f::LOCATOR_ID, m.locator_id.clone()));
            fields.push((f::IP_ADDRESS, opt_text(&m.ip_address)));
        }
    }
    fields
}

struct Fields<'a> {
    uuid: &'a str,
    values: &'a HashMap<String, String>,
}

impl<'a> Fields<'a> {
    fn text(&self, name: &'static str) -> String {
        self.values.get(name).cloned().unwrap_or_default()
    }

    fn required(&self, name: &'static str) -> Result<String> {
        match self.values.get(name) {
            Some(v) if !v.is_empty() => Ok(v.clone()),
            _ => Err(VtepSyncError::invalid_record(self.uuid, name, "missing")),
        }
    }

    fn parsed<T>(&self, name: &'static str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.required(name)?
            .parse()
            .map_err(|e: T::Err| VtepSyncError::invalid_record(self.uuid, name, e.to_string()))
    }

    fn optional<T>(&self, name: &'static str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.values.get(name) {
            Some(v) if !v.is_empty() => self.parsed(name).map(Some),
            _ => Ok(None),
        }
    }
}

/// Decode a stored hash back into a row
pub fn from_fields(table: Table, gateway: &GatewayId, values: &HashMap<String, String>) -> Result<Row> {
    let uuid = values.get(f::UUID).map(String::as_str).unwrap_or_default();
    let fields = Fields { uuid, values };
    let gateway = gateway.clone();

    let row = match table {
        Table::LogicalSwitch => Row::LogicalSwitch(LogicalSwitch {
            uuid: fields.required(f::UUID)?,
            gateway,
            name: fields.text(f::NAME),
            segment_key: fields.optional(f::SEGMENT_KEY)?,
        }),
        Table::PhysicalSwitch => Row::PhysicalSwitch(PhysicalSwitch {
            uuid: fields.required(f::UUID)?,
            gateway,
            name: fields.text(f::NAME),
            tunnel_ip: fields.optional::<IpAddr>(f::TUNNEL_IP)?,
            fault_status: fields.text(f::FAULT_STATUS),
        }),
        Table::PhysicalPort => Row::PhysicalPort(PhysicalPort {
            uuid: fields.required(f::UUID)?,
            gateway,
            name: fields.text(f::NAME),
            physical_switch_id: fields.text(f::PHYSICAL_SWITCH_ID),
            fault_status: fields.text(f::FAULT_STATUS),
        }),
        Table::VlanBinding => Row::VlanBinding(VlanBinding {
            port_uuid: fields.required(f::PORT_UUID)?,
            logical_switch_id: fields.required(f::LOGICAL_SWITCH_ID)?,
            gateway,
            vlan_id: fields.parsed(f::VLAN_ID)?,
        }),
        Table::PhysicalLocator => Row::PhysicalLocator(PhysicalLocator {
            uuid: fields.required(f::UUID)?,
            gateway,
            destination_ip: fields.parsed(f::DESTINATION_IP)?,
        }),
        Table::UcastMacLocal => Row::UcastMacLocal(UcastMacLocal {
            uuid: fields.required(f::UUID)?,
            gateway,
            mac: fields.parsed(f::MAC)?,
            logical_switch_id: fields.required(f::LOGICAL_SWITCH_ID)?,
            locator_id: fields.optional(f::LOCATOR_ID)?,
            ip_address: fields.optional(f::IP_ADDRESS)?,
        }),
        Table::UcastMacRemote => Row::UcastMacRemote(UcastMacRemote {
            uuid: fields.required(f::UUID)?,
            gateway,
            mac: fields.parsed(f::MAC)?,
            logical_switch_id: fields.required(f::LOGICAL_SWITCH_ID)?,
            locator_id: fields.required(f::LOCATOR_ID)?,
            ip_address: fields.optional(f::IP_ADDRESS)?,
        }),
    };
    Ok(row)
}

pub struct RedisEntityStore {
    redis: RedisAdapter,
}

impl RedisEntityStore {
    pub fn new(redis: RedisAdapter) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl EntityStore for RedisEntityStore {
    #[instrument(skip_all, fields(table = %table, key = %key))]
    async fn get(&self, table: Table, key: &NaturalKey) -> Result<Option<Row>> {
        let values = self.redis.hgetall(&redis_key(table, key)).await?;
        if values.is_empty() {
            return Ok(None);
        }
        from_fields(table, &key.gateway, &values).map(Some)
    }

    #[instrument(skip_all, fields(table = %row.table(), key = %row.key()))]
    async fn insert(&self, row: Row) -> Result<bool> {
        let redis_key = redis_key(row.table(), &row.key());
        let created = self
            .redis
            .hset_all_nx(&redis_key, &to_field_values(&row))
            .await?;
        if !created {
            debug!(redis_key = %redis_key, "Row already present");
        }
        Ok(created)
    }

    #[instrument(skip_all, fields(table = %row.table(), key = %row.key()))]
    async fn update(&self, row: Row) -> Result<bool> {
        let redis_key = redis_key(row.table(), &row.key());
        if !self.redis.exists(&redis_key).await? {
            return Ok(false);
        }
        self.redis
            .hset_multiple(&redis_key, &to_field_values(&row))
            .await?;
        Ok(true)
    }

    #[instrument(skip_all, fields(table = %table, key = %key))]
    async fn delete(&self, table: Table, key: &NaturalKey) -> Result<bool> {
        self.redis.del(&redis_key(table, key)).await
    }

    #[instrument(skip(self))]
    async fn scan(&self, table: Table, gateway: &GatewayId) -> Result<Vec<Row>> {
        let pattern = scan_pattern(table, gateway);
        let mut keys = self.redis.keys(&pattern).await?;
        keys.sort();

        let mut rows = Vec::with_capacity(keys.len());
        for redis_key in keys {
            let values = self.redis.hgetall(&redis_key).await?;
            // Deleted between KEYS and HGETALL
            if values.is_empty() {
                continue;
            }
            rows.push(from_fields(table, gateway, &values)?);
        }
        Ok(rows)
    }
}
