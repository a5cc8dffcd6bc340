//! End-to-end change-set processing against the in-memory store

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use sonic_vtepsyncd::store::{fetch, fetch_all};
use sonic_vtepsyncd::{
    FdbEntries, LogicalSwitch, NaturalKey, NotifyTarget, PhysicalPort, PhysicalSwitch, Table,
    UcastMacRemote, VlanBinding,
};
use std::collections::BTreeSet;

fn net(uuid: &str, name: &str, key: u32) -> LogicalSwitch {
    LogicalSwitch {
        uuid: uuid.into(),
        gateway: gateway("ovsdb1"),
        name: name.into(),
        segment_key: Some(key),
    }
}

/// Two logical switches, two hardware switches, ls-a bound on both ports
async fn topology(h: &Harness) {
    let gw = gateway("ovsdb1");
    h.apply(
        &gw,
        json!({
            "new_logical_switches": [
                logical_switch("ls-a", "net-a", 5001),
                logical_switch("ls-b", "net-b", 5002),
            ],
            "new_physical_switches": [
                physical_switch("s1", Some("10.0.0.1")),
                physical_switch("s2", Some("10.0.0.2")),
            ],
            "new_physical_ports": [
                physical_port("p1", "s1", &[("ls-a", 10)]),
                physical_port("p2", "s2", &[("ls-a", 20), ("ls-b", 30)]),
            ],
        }),
    )
    .await;
}

async fn binding_ids(h: &Harness, port: &str) -> BTreeSet<String> {
    let gw = gateway("ovsdb1");
    fetch_all::<VlanBinding>(h.store.as_ref(), &gw)
        .await
        .unwrap()
        .into_iter()
        .filter(|b| b.port_uuid == port)
        .map(|b| b.logical_switch_id)
        .collect()
}

#[tokio::test]
async fn test_new_logical_switches_idempotent() {
    let h = Harness::new();
    let gw = gateway("ovsdb1");
    let changes = json!({"new_logical_switches": [logical_switch("ls-a", "net-a", 5001)]});

    let first = h.apply(&gw, changes.clone()).await;
    let before = h.store.snapshot();
    let second = h.apply(&gw, changes).await;

    assert_eq!(first.applied.inserted, 1);
    assert_eq!(second.applied.inserted, 0);
    assert_eq!(h.store.snapshot(), before);
    assert_eq!(h.store.count(Table::LogicalSwitch), 1);
}

#[tokio::test]
async fn test_delete_unknown_logical_switch_is_noop() {
    let h = Harness::new();
    topology(&h).await;
    let before = h.store.snapshot();

    let summary = h
        .apply(
            &gateway("ovsdb1"),
            json!({"deleted_logical_switches": [deleted("ls-missing")]}),
        )
        .await;

    assert_eq!(summary.applied.deleted, 0);
    assert_eq!(h.store.snapshot(), before);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_modified_port_replaces_bindings() {
    let h = Harness::new();
    let gw = gateway("ovsdb1");
    h.apply(
        &gw,
        json!({
            "new_logical_switches": [
                logical_switch("ls-a", "net-a", 1),
                logical_switch("ls-b", "net-b", 2),
                logical_switch("ls-c", "net-c", 3),
            ],
            "new_physical_switches": [physical_switch("s1", Some("10.0.0.1"))],
            "new_physical_ports": [physical_port("p1", "s1", &[("ls-a", 10), ("ls-b", 20)])],
        }),
    )
    .await;
    assert_eq!(
        binding_ids(&h, "p1").await,
        BTreeSet::from(["ls-a".to_string(), "ls-b".to_string()])
    );

    h.apply(
        &gw,
        json!({"modified_physical_ports": [physical_port("p1", "s1", &[("ls-b", 21), ("ls-c", 30)])]}),
    )
    .await;

    assert_eq!(
        binding_ids(&h, "p1").await,
        BTreeSet::from(["ls-b".to_string(), "ls-c".to_string()])
    );
    let ls_b: VlanBinding = fetch(h.store.as_ref(), &NaturalKey::vlan_binding(&gw, "p1", "ls-b"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ls_b.vlan_id, 21);
}

#[tokio::test]
async fn test_modified_unknown_port_is_created() {
    let h = Harness::new();
    let gw = gateway("ovsdb1");
    h.apply(&gw, json!({"new_logical_switches": [logical_switch("ls-a", "net-a", 1)]}))
        .await;

    let summary = h
        .apply(
            &gw,
            json!({"modified_physical_ports": [physical_port("p7", "s1", &[("ls-a", 7)])]}),
        )
        .await;

    assert_eq!(summary.applied.inserted, 2);
    let port: Option<PhysicalPort> = fetch(h.store.as_ref(), &NaturalKey::new(&gw, "p7"))
        .await
        .unwrap();
    assert!(port.is_some());
}

#[tokio::test]
async fn test_modified_switch_updates_fault_status_only() {
    let h = Harness::new();
    topology(&h).await;
    let gw = gateway("ovsdb1");

    let summary = h
        .apply(
            &gw,
            json!({"modified_physical_switches": [{
                "uuid": "s1",
                "name": "renamed",
                "tunnel_ip": "10.9.9.9",
                "switch_fault_status": ["set", ["power_supply_failure"]],
            }]}),
        )
        .await;
    assert_eq!(summary.applied.updated, 1);

    let switch: PhysicalSwitch = fetch(h.store.as_ref(), &NaturalKey::new(&gw, "s1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(switch.name, "s1");
    assert_eq!(switch.tunnel_ip, Some(ip("10.0.0.1")));
    assert_eq!(switch.fault_status, "power_supply_failure");

    // unknown switches are not created by a modification
    h.apply(
        &gw,
        json!({"modified_physical_switches": [physical_switch("s9", Some("10.0.0.9"))]}),
    )
    .await;
    assert_eq!(h.store.count(Table::PhysicalSwitch), 2);
}

#[tokio::test]
async fn test_binding_to_unknown_logical_switch_skipped() {
    let h = Harness::new();
    let gw = gateway("ovsdb1");
    let summary = h
        .apply(
            &gw,
            json!({
                "new_logical_switches": [logical_switch("ls-a", "net-a", 1)],
                "new_physical_ports": [physical_port("p1", "s1", &[("ls-a", 10), ("ls-zz", 11)])],
            }),
        )
        .await;

    assert_eq!(summary.applied.skipped, 1);
    assert_eq!(
        binding_ids(&h, "p1").await,
        BTreeSet::from(["ls-a".to_string()])
    );
    assert_eq!(h.sync.stats().bindings_skipped, 1);
}

#[tokio::test]
async fn test_remote_mac_fans_out_to_switch_tunnel_ips() {
    let h = Harness::new();
    topology(&h).await;
    let gw = gateway("ovsdb1");

    let summary = h
        .apply(
            &gw,
            json!({
                "new_physical_locators": [locator("pl-1", "10.0.0.5")],
                "new_remote_macs": [remote_mac("rm-1", "fa:16:3e:00:00:01", "ls-a", "pl-1")],
            }),
        )
        .await;

    assert_eq!(summary.l2pop.added, 2);
    assert_eq!(
        h.notifier.adds(),
        vec![
            FdbEntries::flooding(&net("ls-a", "net-a", 5001), ip("10.0.0.1")),
            FdbEntries::flooding(&net("ls-a", "net-a", 5001), ip("10.0.0.2")),
        ]
    );
    assert!(h.notifier.removes().is_empty());
    assert_eq!(h.store.count(Table::UcastMacRemote), 1);
}

#[tokio::test]
async fn test_remote_mac_redelivery_announces_again() {
    let h = Harness::new();
    topology(&h).await;
    let gw = gateway("ovsdb1");
    let changes = json!({
        "new_remote_macs": [remote_mac("rm-1", "fa:16:3e:00:00:01", "ls-b", "pl-1")],
    });

    h.apply(&gw, changes.clone()).await;
    let summary = h.apply(&gw, changes).await;

    assert_eq!(summary.applied.inserted, 0);
    assert_eq!(summary.l2pop.added, 1);
    assert_eq!(h.notifier.adds().len(), 2);
}

#[tokio::test]
async fn test_remote_mac_without_bindings_sends_nothing() {
    let h = Harness::new();
    let gw = gateway("ovsdb1");
    let summary = h
        .apply(
            &gw,
            json!({
                "new_logical_switches": [logical_switch("ls-a", "net-a", 1)],
                "new_remote_macs": [remote_mac("rm-1", "fa:16:3e:00:00:01", "ls-a", "pl-1")],
            }),
        )
        .await;

    assert_eq!(summary.l2pop, Default::default());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_unresolved_remote_mac_is_skipped() {
    let h = Harness::new();
    topology(&h).await;
    let gw = gateway("ovsdb1");

    // p9 points at a switch the gateway never reported
    let summary = h
        .apply(
            &gw,
            json!({
                "new_physical_ports": [physical_port("p9", "s-missing", &[("ls-b", 90)])],
                "new_remote_macs": [
                    remote_mac("rm-1", "fa:16:3e:00:00:01", "ls-b", "pl-1"),
                    remote_mac("rm-2", "fa:16:3e:00:00:02", "ls-a", "pl-1"),
                ],
            }),
        )
        .await;

    assert_eq!(summary.l2pop.resolution_failures, 1);
    assert_eq!(summary.l2pop.added, 2);
    assert_eq!(h.store.count(Table::UcastMacRemote), 2);
    assert_eq!(h.sync.stats().resolution_failures, 1);
}

#[tokio::test]
async fn test_switch_without_tunnel_ip_contributes_nothing() {
    let h = Harness::new();
    let gw = gateway("ovsdb1");
    let summary = h
        .apply(
            &gw,
            json!({
                "new_logical_switches": [logical_switch("ls-a", "net-a", 1)],
                "new_physical_switches": [
                    physical_switch("s1", None),
                    physical_switch("s2", Some("10.0.0.2")),
                ],
                "new_physical_ports": [
                    physical_port("p1", "s1", &[("ls-a", 10)]),
                    physical_port("p2", "s2", &[("ls-a", 10)]),
                ],
                "new_remote_macs": [remote_mac("rm-1", "fa:16:3e:00:00:01", "ls-a", "pl-1")],
            }),
        )
        .await;

    assert_eq!(summary.l2pop.added, 1);
    assert_eq!(h.notifier.adds()[0].tunnel_ips(), vec![ip("10.0.0.2")]);
}

#[tokio::test]
async fn test_agent_locator_delete_notifies_host() {
    let h = Harness::with_agents(agent("compute-1", "10.0.0.5"));
    topology(&h).await;
    let gw = gateway("ovsdb1");
    h.apply(
        &gw,
        json!({
            "new_physical_locators": [locator("pl-1", "10.0.0.5")],
            "new_remote_macs": [remote_mac("rm-1", "fa:16:3e:00:00:01", "ls-a", "pl-1")],
        }),
    )
    .await;
    h.notifier.clear();

    let summary = h
        .apply(&gw, json!({"deleted_physical_locators": [locator("pl-1", "10.0.0.5")]}))
        .await;

    let mut expected = Vec::new();
    for ls in [net("ls-a", "net-a", 5001), net("ls-b", "net-b", 5002)] {
        for tunnel_ip in ["10.0.0.1", "10.0.0.2"] {
            expected.push((
                FdbEntries::flooding(&ls, ip(tunnel_ip)),
                NotifyTarget::Host("compute-1".to_string()),
            ));
        }
    }
    assert_eq!(h.notifier.removes(), expected);
    assert_eq!(summary.l2pop.removed, 4);
    assert!(h.notifier.adds().is_empty());

    // the locator took its remote MAC with it
    assert_eq!(h.store.count(Table::PhysicalLocator), 0);
    assert_eq!(h.store.count(Table::UcastMacRemote), 0);
}

#[tokio::test]
async fn test_foreign_locator_delete_fans_out() {
    let h = Harness::with_agents(agent("compute-1", "10.0.0.5"));
    topology(&h).await;
    let gw = gateway("ovsdb1");
    h.apply(&gw, json!({"new_physical_locators": [locator("pl-2", "203.0.113.9")]}))
        .await;

    let summary = h
        .apply(&gw, json!({"deleted_physical_locators": [locator("pl-2", "203.0.113.9")]}))
        .await;

    assert_eq!(
        h.notifier.removes(),
        vec![
            (
                FdbEntries::flooding(&net("ls-a", "net-a", 5001), ip("203.0.113.9")),
                NotifyTarget::Fanout
            ),
            (
                FdbEntries::flooding(&net("ls-b", "net-b", 5002), ip("203.0.113.9")),
                NotifyTarget::Fanout
            ),
        ]
    );
    assert_eq!(summary.l2pop.removed, 2);
}

#[tokio::test]
async fn test_delete_physical_switch_cascades() {
    let h = Harness::new();
    topology(&h).await;
    let gw = gateway("ovsdb1");

    let summary = h
        .apply(&gw, json!({"deleted_physical_switches": [deleted("s2")]}))
        .await;

    // s2, p2 and its two bindings
    assert_eq!(summary.applied.deleted, 4);
    assert_eq!(h.store.count(Table::PhysicalSwitch), 1);
    assert_eq!(h.store.count(Table::PhysicalPort), 1);
    assert!(binding_ids(&h, "p2").await.is_empty());
    assert_eq!(binding_ids(&h, "p1").await.len(), 1);
    assert_eq!(h.store.count(Table::LogicalSwitch), 2);
}

#[tokio::test]
async fn test_delete_logical_switch_cascades() {
    let h = Harness::new();
    topology(&h).await;
    let gw = gateway("ovsdb1");
    h.apply(
        &gw,
        json!({
            "new_remote_macs": [
                remote_mac("rm-1", "fa:16:3e:00:00:01", "ls-a", "pl-1"),
                remote_mac("rm-2", "fa:16:3e:00:00:02", "ls-b", "pl-1"),
            ],
            "new_local_macs": [{
                "uuid": "lm-1",
                "mac": "fa:16:3e:00:00:03",
                "logical_switch_id": "ls-a",
            }],
        }),
    )
    .await;

    h.apply(&gw, json!({"deleted_logical_switches": [deleted("ls-a")]}))
        .await;

    let remaining: Vec<UcastMacRemote> = fetch_all(h.store.as_ref(), &gw).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].logical_switch_id, "ls-b");
    assert_eq!(h.store.count(Table::UcastMacLocal), 0);
    assert!(binding_ids(&h, "p1").await.is_empty());
    assert_eq!(binding_ids(&h, "p2").await, BTreeSet::from(["ls-b".to_string()]));
    assert_eq!(h.store.count(Table::PhysicalPort), 2);
}

#[tokio::test]
async fn test_deletes_and_creates_in_one_change_set() {
    let h = Harness::new();
    topology(&h).await;
    let gw = gateway("ovsdb1");

    // parents are created before children and children deleted before parents
    let summary = h
        .apply(
            &gw,
            json!({
                "deleted_physical_ports": [deleted("p1")],
                "new_physical_ports": [physical_port("p3", "s3", &[("ls-c", 5)])],
                "new_physical_switches": [physical_switch("s3", Some("10.0.0.3"))],
                "new_logical_switches": [logical_switch("ls-c", "net-c", 5003)],
            }),
        )
        .await;

    assert_eq!(summary.records, 4);
    assert_eq!(summary.applied.skipped, 0);
    assert_eq!(binding_ids(&h, "p3").await, BTreeSet::from(["ls-c".to_string()]));
    assert!(binding_ids(&h, "p1").await.is_empty());
}

#[tokio::test]
async fn test_unknown_tags_ignored() {
    let h = Harness::new();
    let summary = h
        .apply(
            &gateway("ovsdb1"),
            json!({"new_mcast_macs_remote": [{"uuid": "mm-1"}]}),
        )
        .await;
    assert_eq!(summary.records, 0);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_gateways_do_not_share_rows() {
    let h = Harness::new();
    let gw1 = gateway("ovsdb1");
    let gw2 = gateway("ovsdb2");
    let ls = json!({"new_logical_switches": [logical_switch("ls-a", "net-a", 1)]});

    h.apply(&gw1, ls.clone()).await;
    h.apply(&gw2, ls).await;
    assert_eq!(h.store.count(Table::LogicalSwitch), 2);

    h.apply(&gw1, json!({"deleted_logical_switches": [deleted("ls-a")]}))
        .await;
    assert!(h.store.snapshot_gateway(&gw1).is_empty());
    assert_eq!(h.store.snapshot_gateway(&gw2).len(), 1);
}
