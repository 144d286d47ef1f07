//! Unit tests for nt-topology

use nt_types::NodeId;

use crate::{Topology, TopologyError};

#[test]
fn create_and_lookup_data_center() {
    let mut topology = Topology::new();
    let dc = topology.create_data_center("dc1").unwrap();
    assert_eq!(topology.data_center_by_name("dc1").unwrap().id, dc);
}

#[test]
fn duplicate_data_center_name_fails_and_leaves_state_untouched() {
    let mut topology = Topology::new();
    topology.create_data_center("dc1").unwrap();
    let err = topology.create_data_center("dc1").unwrap_err();
    assert_eq!(err, TopologyError::AlreadyExists("dc1".to_string()));
    assert_eq!(topology.data_centers().count(), 1);
}

#[test]
fn rename_rack_fails_atomically_on_collision() {
    let mut topology = Topology::new();
    let r1 = topology.create_rack("rack1", None).unwrap();
    topology.create_rack("rack2", None).unwrap();

    let err = topology.rename_rack(r1, "rack2").unwrap_err();
    assert_eq!(err, TopologyError::AlreadyExists("rack2".to_string()));
    // Old name must still resolve; nothing was mutated on failure.
    assert_eq!(topology.rack_by_name("rack1").unwrap().id, r1);
}

#[test]
fn rack_index_allocated_and_freed_on_destroy() {
    let mut topology = Topology::new();
    let r1 = topology.create_rack("rack1", None).unwrap();
    let idx1 = topology.rack(r1).unwrap().index;
    assert_eq!(idx1.get(), 1);

    topology.destroy_rack(r1).unwrap();

    let r2 = topology.create_rack("rack2", None).unwrap();
    assert_eq!(topology.rack(r2).unwrap().index.get(), 1);
}

#[test]
fn destroy_rack_unbinds_member_hosts() {
    let mut topology = Topology::new();
    let rack = topology.create_rack("rack1", None).unwrap();
    let host = topology.create_host("host1", rack).unwrap();

    let affected = topology.destroy_rack(rack).unwrap();
    assert_eq!(affected, vec![host]);
    assert_eq!(topology.host(host).unwrap().rack, None);
}

#[test]
fn destroy_data_center_unbinds_member_racks() {
    let mut topology = Topology::new();
    let dc = topology.create_data_center("dc1").unwrap();
    let rack = topology.create_rack("rack1", Some(dc)).unwrap();

    let affected = topology.destroy_data_center(dc).unwrap();
    assert_eq!(affected, vec![rack]);
    assert_eq!(topology.rack(rack).unwrap().data_center, None);
}

#[test]
fn set_rack_parent_reports_affected_hosts() {
    let mut topology = Topology::new();
    let dc1 = topology.create_data_center("dc1").unwrap();
    let dc2 = topology.create_data_center("dc2").unwrap();
    let rack = topology.create_rack("rack1", Some(dc1)).unwrap();
    let host1 = topology.create_host("host1", rack).unwrap();
    let host2 = topology.create_host("host2", rack).unwrap();

    let reparented = topology.set_rack_parent(rack, Some(dc2)).unwrap();
    assert_eq!(reparented.old_data_center, Some(dc1));
    assert_eq!(reparented.new_data_center, Some(dc2));
    let mut affected = reparented.affected_hosts;
    affected.sort_by_key(|h| h.get());
    let mut expected = vec![host1, host2];
    expected.sort_by_key(|h| h.get());
    assert_eq!(affected, expected);
}

#[test]
fn rack_index_pool_exhausts_at_63() {
    let mut topology = Topology::new();
    for i in 0..63 {
        topology.create_rack(format!("rack{i}"), None).unwrap();
    }
    let err = topology.create_rack("rack63", None).unwrap_err();
    assert_eq!(err, TopologyError::LimitReached);
}

#[test]
fn host_membership_tracks_nodes() {
    let mut topology = Topology::new();
    let rack = topology.create_rack("rack1", None).unwrap();
    let host = topology.create_host("host1", rack).unwrap();

    topology.add_node_to_host(host, NodeId::from(1)).unwrap();
    topology.add_node_to_host(host, NodeId::from(2)).unwrap();
    assert_eq!(topology.host(host).unwrap().members.len(), 2);

    topology.remove_node_from_host(host, NodeId::from(1)).unwrap();
    assert_eq!(topology.host(host).unwrap().members.len(), 1);
}

#[test]
fn create_host_requires_existing_rack() {
    let mut topology = Topology::new();
    let bogus_rack = nt_types::RackId::new(999);
    let err = topology.create_host("host1", bogus_rack).unwrap_err();
    assert_eq!(err, TopologyError::RackNotFound(bogus_rack));
}
