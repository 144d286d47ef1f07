//! Attribute-tree projection (C8, spec §4.8/§6).
//!
//! The attribute tree is the operator-facing read/write view over nodes:
//! a fixed list of named attributes, some read-only (derived from the
//! core's own state), some writable. Writes never touch [`nt_core::Node`]
//! fields directly — they go through the same registry/topology setters
//! the heartbeat kernel itself would use, so a write can never leave tags
//! or host bindings out of sync with the field it changed.

use std::collections::{BTreeMap, BTreeSet};

use nt_core::{Node, Registry, Statistics};
use nt_topology::Topology;
use nt_types::{MaintenanceRequestId, NodeState, RackId};

use crate::error::{RpcError, ServerResult};

/// The writable subset of a node's attributes (spec §4.8: "Writable on a
/// node: `banned, decommissioned, disable-write-sessions,
/// disable-scheduler-jobs, disable-tablet-cells, rack, user-tags,
/// resource-limits-overrides`").
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAttributeWrite {
    Banned(bool),
    Decommissioned(bool),
    DisableWriteSessions(bool),
    DisableSchedulerJobs(bool),
    DisableTabletCells(bool),
    Rack(RackId),
    UserTags(BTreeSet<String>),
    ResourceLimitsOverrides(BTreeMap<String, u64>),
}

/// Read projection of a node's full attribute list (spec §6's "Attribute
/// surface"), both the writable attributes and the read-only ones derived
/// from state the kernel already tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAttributeView {
    pub banned: bool,
    pub decommissioned: bool,
    pub disable_write_sessions: bool,
    pub disable_scheduler_jobs: bool,
    pub disable_tablet_cells: bool,
    pub rack: Option<RackId>,
    pub user_tags: BTreeSet<String>,
    pub resource_limits_overrides: BTreeMap<String, u64>,
    pub tags: BTreeSet<String>,
    pub data_center: Option<String>,
    pub state: nt_types::NodeState,
    pub multicell_states: BTreeMap<nt_types::CellTag, nt_types::NodeState>,
    pub last_seen_time: nt_types::Timestamp,
    pub register_time: nt_types::Timestamp,
    pub addresses: BTreeMap<String, String>,
    pub alerts: Vec<String>,
    pub statistics: Statistics,
    pub resource_usage: BTreeMap<String, u64>,
    /// Effective resource ceilings. This subsystem has no scheduler-side
    /// computed baseline to merge against, so it is currently just the
    /// operator's `resource-limits-overrides` (see DESIGN.md).
    pub resource_limits: BTreeMap<String, u64>,
    pub chunk_replica_count: u32,
    pub destroyed_chunk_replica_count: u32,
}

pub fn read_node_attributes(node: &Node, topology: &Topology) -> NodeAttributeView {
    NodeAttributeView {
        banned: node.is_banned(),
        decommissioned: node.is_decommissioned(),
        disable_write_sessions: node.effective_disable_write_sessions(),
        disable_scheduler_jobs: node.are_scheduler_jobs_disabled(),
        disable_tablet_cells: node.are_tablet_cells_disabled(),
        rack: node.rack(topology).map(|r| r.id),
        user_tags: node.user_tags().clone(),
        resource_limits_overrides: node.resource_limits_overrides().clone(),
        tags: node.tags().clone(),
        data_center: node.data_center(topology).map(|dc| dc.name.clone()),
        state: node.aggregated_state(),
        multicell_states: node.multicell_states().clone(),
        last_seen_time: node.last_seen_time(),
        register_time: node.register_time(),
        addresses: node.addresses().clone(),
        alerts: node.alerts().to_vec(),
        statistics: node.statistics().clone(),
        resource_usage: node.statistics().resource_usage.clone(),
        resource_limits: node.resource_limits_overrides().clone(),
        chunk_replica_count: node.replicas().approved_count() as u32,
        destroyed_chunk_replica_count: node.replicas().destroyed_count() as u32,
    }
}

/// Synthetic read-only "cluster node map" (spec §4.8): a whole-registry
/// view bucketing every node's self-reported address by aggregated state,
/// plus the cluster-wide statistics an operator would otherwise have to
/// fold over every node's attributes by hand.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterNodeMap {
    pub offline: Vec<String>,
    pub registered: Vec<String>,
    pub online: Vec<String>,
    pub unregistered: Vec<String>,
    pub mixed: Vec<String>,
    pub unknown: Vec<String>,
    pub available_space_by_medium: BTreeMap<String, u64>,
    pub used_space_by_medium: BTreeMap<String, u64>,
    pub chunk_replica_count: u64,
    pub online_count: u32,
    pub banned_count: u32,
    pub decommissioned_count: u32,
    pub full_count: u32,
    pub with_alerts_count: u32,
}

fn node_name(node: &Node) -> String {
    let address = node.default_address();
    if address.is_empty() {
        node.id.to_string()
    } else {
        address.to_string()
    }
}

/// A node is considered "full" on a medium if its reported usage on that
/// medium has caught up to (or passed) the total space reported for it.
fn node_is_full(node: &Node) -> bool {
    let stats = node.statistics();
    stats
        .total_space
        .iter()
        .any(|(medium, &total)| stats.resource_usage.get(medium).is_some_and(|&used| used >= total))
}

pub fn cluster_node_map(registry: &Registry) -> ClusterNodeMap {
    let mut map = ClusterNodeMap::default();

    for node in registry.iter() {
        let name = node_name(node);
        match node.aggregated_state() {
            NodeState::Offline => map.offline.push(name),
            NodeState::Registered => map.registered.push(name),
            NodeState::Online => {
                map.online_count += 1;
                map.online.push(name);
            }
            NodeState::Unregistered => map.unregistered.push(name),
            NodeState::Mixed => map.mixed.push(name),
            NodeState::Unknown => map.unknown.push(name),
        }

        if node.is_banned() {
            map.banned_count += 1;
        }
        if node.is_decommissioned() {
            map.decommissioned_count += 1;
        }
        if node_is_full(node) {
            map.full_count += 1;
        }
        if !node.alerts().is_empty() {
            map.with_alerts_count += 1;
        }

        map.chunk_replica_count += node.replicas().approved_count() as u64;

        let stats = node.statistics();
        for (medium, &total) in &stats.total_space {
            *map.available_space_by_medium.entry(medium.clone()).or_insert(0) += total;
            let used = stats.resource_usage.get(medium).copied().unwrap_or(0);
            *map.used_space_by_medium.entry(medium.clone()).or_insert(0) += used;
        }
    }

    for (medium, used) in &map.used_space_by_medium {
        if let Some(total) = map.available_space_by_medium.get_mut(medium) {
            *total = total.saturating_sub(*used);
        }
    }

    map
}

/// Applies one attribute write to `node_id`, using `next_request_id` to
/// mint a fresh [`MaintenanceRequestId`] for a maintenance-kind write that
/// turns on (a request that turns one off clears by kind, spec §4.8:
/// writes "must go through the registry setters so derived state...stays
/// consistent").
pub fn apply_node_attribute_write(
    registry: &mut Registry,
    topology: &mut Topology,
    node_id: nt_types::NodeId,
    write: NodeAttributeWrite,
    next_request_id: impl FnOnce() -> MaintenanceRequestId,
) -> ServerResult<()> {
    use nt_types::MaintenanceKind;

    if let NodeAttributeWrite::Rack(rack_id) = write {
        return apply_rack_write(registry, topology, node_id, rack_id);
    }

    let node = registry
        .find_mut(node_id)
        .ok_or(RpcError::NoSuchNode(node_id))?;

    match write {
        NodeAttributeWrite::Banned(on) => set_maintenance_flag(node, MaintenanceKind::Ban, on, next_request_id),
        NodeAttributeWrite::Decommissioned(on) => {
            set_maintenance_flag(node, MaintenanceKind::Decommission, on, next_request_id)
        }
        NodeAttributeWrite::DisableWriteSessions(on) => {
            set_maintenance_flag(node, MaintenanceKind::DisableWriteSessions, on, next_request_id)
        }
        NodeAttributeWrite::DisableSchedulerJobs(on) => {
            set_maintenance_flag(node, MaintenanceKind::DisableSchedulerJobs, on, next_request_id)
        }
        NodeAttributeWrite::DisableTabletCells(on) => {
            set_maintenance_flag(node, MaintenanceKind::DisableTabletCells, on, next_request_id)
        }
        NodeAttributeWrite::UserTags(tags) => {
            node.set_user_tags(tags, topology);
        }
        NodeAttributeWrite::ResourceLimitsOverrides(overrides) => {
            node.set_resource_limits_overrides(overrides);
        }
        NodeAttributeWrite::Rack(_) => unreachable!("handled above"),
    }
    Ok(())
}

fn set_maintenance_flag(
    node: &mut Node,
    kind: nt_types::MaintenanceKind,
    on: bool,
    next_request_id: impl FnOnce() -> MaintenanceRequestId,
) {
    if on {
        node.set_maintenance(next_request_id(), kind);
    } else {
        node.clear_maintenance_kind(kind);
    }
}

/// Rebinding a node's `rack` attribute rebinds the rack of the host the
/// node is attached to (a node has no rack of its own — it inherits one
/// through its host, spec §4.2), then rebuilds the node's own tags so the
/// read immediately reflects the write (scenario 5's "rack rebind and tag
/// propagation").
fn apply_rack_write(
    registry: &mut Registry,
    topology: &mut Topology,
    node_id: nt_types::NodeId,
    rack_id: RackId,
) -> ServerResult<()> {
    let host_id = registry
        .find(node_id)
        .ok_or(RpcError::NoSuchNode(node_id))?
        .host_id()
        .ok_or_else(|| RpcError::InvalidState(format!("node {node_id} has no host to rebind")))?;

    topology.set_host_rack(host_id, rack_id)?;

    let node = registry.find_mut(node_id).expect("checked above");
    node.rebuild_tags(topology);
    Ok(())
}
