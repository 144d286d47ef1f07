//! The node object (C2).
//!
//! A `Node` is constructed with only its id; every mutable field is
//! populated by its first registration. Setters for address map, tags,
//! host and resources are private to this crate — external callers go
//! through [`crate::registry::Registry`] so derived state never drifts
//! out of sync with its sources.

use std::collections::{BTreeMap, BTreeSet};

use nt_topology::{DataCenter, Host, Rack, Topology};
use nt_types::{
    CellTag, FlavorSet, HostId, LeaseTransactionId, MaintenanceKind, MaintenanceRequestId,
    MediumIndex, NodeHeartbeatKind, NodeId, NodeState, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::heartbeat::Statistics;
use crate::replication::ReplicaBookkeeping;

/// A cluster node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub(crate) default_address: String,
    pub(crate) addresses: BTreeMap<String, String>,
    pub(crate) flavors: FlavorSet,
    pub(crate) heartbeats_received: BTreeSet<NodeHeartbeatKind>,
    pub(crate) user_tags: BTreeSet<String>,
    pub(crate) node_tags: BTreeSet<String>,
    pub(crate) effective_tags: BTreeSet<String>,
    pub(crate) host: Option<HostId>,
    pub(crate) local_state: NodeState,
    pub(crate) multicell_states: BTreeMap<CellTag, NodeState>,
    pub(crate) local_cell_tag: Option<CellTag>,
    pub(crate) aggregated_state: NodeState,
    pub(crate) lease_transaction: Option<LeaseTransactionId>,
    pub(crate) maintenance_requests: BTreeMap<MaintenanceRequestId, MaintenanceKind>,
    pub(crate) statistics: Statistics,
    pub(crate) alerts: Vec<String>,
    pub(crate) register_time: Timestamp,
    pub(crate) last_seen_time: Timestamp,
    pub(crate) visit_marks: BTreeMap<MediumIndex, u64>,
    pub(crate) replicas: ReplicaBookkeeping,
    /// Operator-set overrides of the per-resource limits otherwise derived
    /// from the node's flavor and reported capacity. Writable through the
    /// attribute tree (SPEC_FULL §6 attribute surface); opaque to the
    /// kernel itself, which never reads this map.
    pub(crate) resource_limits_overrides: BTreeMap<String, u64>,
}

/// Strips the port off a `host:port` address. Addresses with no colon
/// (or only a bracketed IPv6 literal) pass through unchanged.
fn service_host_name(address: &str) -> String {
    match address.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
            host.to_string()
        }
        _ => address.to_string(),
    }
}

impl Node {
    /// Constructs an unregistered node shell. Every other field is
    /// populated by the first `Register` mutation. `replication_priority_count`
    /// sizes the push/pull replication queues once, at construction —
    /// there is no later resize path, so every caller must pass the value
    /// the node should live with for good.
    pub fn new(id: NodeId, replication_priority_count: usize) -> Self {
        Self {
            id,
            default_address: String::new(),
            addresses: BTreeMap::new(),
            flavors: FlavorSet::empty(),
            heartbeats_received: BTreeSet::new(),
            user_tags: BTreeSet::new(),
            node_tags: BTreeSet::new(),
            effective_tags: BTreeSet::new(),
            host: None,
            local_state: NodeState::Offline,
            multicell_states: BTreeMap::new(),
            local_cell_tag: None,
            aggregated_state: NodeState::Offline,
            lease_transaction: None,
            maintenance_requests: BTreeMap::new(),
            statistics: Statistics::default(),
            alerts: Vec::new(),
            register_time: Timestamp::ZERO,
            last_seen_time: Timestamp::ZERO,
            visit_marks: BTreeMap::new(),
            replicas: ReplicaBookkeeping::new(replication_priority_count),
            resource_limits_overrides: BTreeMap::new(),
        }
    }

    pub fn replicas(&self) -> &ReplicaBookkeeping {
        &self.replicas
    }

    pub fn replicas_mut(&mut self) -> &mut ReplicaBookkeeping {
        &mut self.replicas
    }

    pub fn local_state(&self) -> NodeState {
        self.local_state
    }

    pub fn aggregated_state(&self) -> NodeState {
        self.aggregated_state
    }

    pub fn addresses(&self) -> &BTreeMap<String, String> {
        &self.addresses
    }

    pub fn flavors(&self) -> FlavorSet {
        self.flavors
    }

    pub fn host_id(&self) -> Option<HostId> {
        self.host
    }

    pub fn lease_transaction(&self) -> Option<LeaseTransactionId> {
        self.lease_transaction
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.effective_tags
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    pub fn user_tags(&self) -> &BTreeSet<String> {
        &self.user_tags
    }

    pub fn node_tags(&self) -> &BTreeSet<String> {
        &self.node_tags
    }

    /// The address this node registered and is indexed under (spec §4.1's
    /// compute-default-address, already resolved by the time a `Register`
    /// command reaches the kernel). Empty for a not-yet-registered shell.
    pub fn default_address(&self) -> &str {
        &self.default_address
    }

    /// The service host name derived from the default address (spec §3):
    /// the host portion of `host:port`, or the whole address if it has no
    /// port. `None` before the node has registered.
    pub fn service_host_name(&self) -> Option<String> {
        if self.default_address.is_empty() {
            None
        } else {
            Some(service_host_name(&self.default_address))
        }
    }

    pub fn heartbeats_received(&self) -> &BTreeSet<NodeHeartbeatKind> {
        &self.heartbeats_received
    }

    /// Records a received heartbeat kind. Idempotent re-delivery of the
    /// same kind is harmless — the set only ever grows until unregister.
    pub fn record_heartbeat_kind(&mut self, kind: NodeHeartbeatKind) {
        self.heartbeats_received.insert(kind);
    }

    /// A node counts as online only once every heartbeat kind implied by
    /// its flavors has arrived at least once (spec §3/§4.4). A node with
    /// no flavors has no required kinds, so this holds vacuously on its
    /// first full heartbeat.
    pub fn has_received_all_required_heartbeats(&self) -> bool {
        self.flavors
            .required_heartbeats()
            .all(|kind| self.heartbeats_received.contains(&kind))
    }

    pub fn multicell_states(&self) -> &BTreeMap<CellTag, NodeState> {
        &self.multicell_states
    }

    pub fn local_cell_tag(&self) -> Option<CellTag> {
        self.local_cell_tag
    }

    pub fn maintenance_requests(&self) -> &BTreeMap<MaintenanceRequestId, MaintenanceKind> {
        &self.maintenance_requests
    }

    pub fn register_time(&self) -> Timestamp {
        self.register_time
    }

    pub fn last_seen_time(&self) -> Timestamp {
        self.last_seen_time
    }

    pub fn visit_marks(&self) -> &BTreeMap<MediumIndex, u64> {
        &self.visit_marks
    }

    // ----------------------------------------------------------------
    // Derived boolean flags (SPEC_FULL §11.1): each is an OR over the
    // maintenance-request map for that kind.
    // ----------------------------------------------------------------

    pub fn is_banned(&self) -> bool {
        self.has_maintenance(MaintenanceKind::Ban)
    }

    pub fn is_decommissioned(&self) -> bool {
        self.has_maintenance(MaintenanceKind::Decommission)
    }

    pub fn are_scheduler_jobs_disabled(&self) -> bool {
        self.has_maintenance(MaintenanceKind::DisableSchedulerJobs)
    }

    pub fn are_tablet_cells_disabled(&self) -> bool {
        self.has_maintenance(MaintenanceKind::DisableTabletCells)
    }

    /// A node with write sessions disabled directly, or banned, or
    /// decommissioned, has its effective write-session flag set — a ban or
    /// decommission always implies write sessions are off too.
    pub fn effective_disable_write_sessions(&self) -> bool {
        self.has_maintenance(MaintenanceKind::DisableWriteSessions)
            || self.is_banned()
            || self.is_decommissioned()
    }

    fn has_maintenance(&self, kind: MaintenanceKind) -> bool {
        self.maintenance_requests.values().any(|k| *k == kind)
    }

    pub fn set_maintenance(&mut self, request_id: MaintenanceRequestId, kind: MaintenanceKind) {
        self.maintenance_requests.insert(request_id, kind);
    }

    pub fn clear_maintenance(&mut self, request_id: MaintenanceRequestId) {
        self.maintenance_requests.remove(&request_id);
    }

    /// Clears every maintenance request of `kind`, regardless of which
    /// request id raised it. Used by attribute-tree writes, which toggle a
    /// boolean (`banned = false`) without knowing the request id that set
    /// it in the first place.
    pub fn clear_maintenance_kind(&mut self, kind: MaintenanceKind) {
        self.maintenance_requests.retain(|_, k| *k != kind);
    }

    pub fn resource_limits_overrides(&self) -> &BTreeMap<String, u64> {
        &self.resource_limits_overrides
    }

    pub fn set_resource_limits_overrides(&mut self, overrides: BTreeMap<String, u64>) {
        self.resource_limits_overrides = overrides;
    }

    // ----------------------------------------------------------------
    // Topology convenience chain (SPEC_FULL §11.4)
    // ----------------------------------------------------------------

    pub fn host<'a>(&self, topology: &'a Topology) -> Option<&'a Host> {
        self.host.and_then(|id| topology.host(id))
    }

    pub fn rack<'a>(&self, topology: &'a Topology) -> Option<&'a Rack> {
        self.host(topology)
            .and_then(|h| h.rack)
            .and_then(|id| topology.rack(id))
    }

    pub fn data_center<'a>(&self, topology: &'a Topology) -> Option<&'a DataCenter> {
        self.rack(topology)
            .and_then(|r| r.data_center)
            .and_then(|id| topology.data_center(id))
    }

    /// Rebuilds the effective tag set from every source (spec §3): user
    /// tags, node tags (self-reported at registration), and the derived
    /// tags — service-host-name, host, rack and data-center names (the
    /// non-null ancestors). Invoked on any source change; idempotent.
    pub fn rebuild_tags(&mut self, topology: &Topology) {
        let mut tags: BTreeSet<String> = self.user_tags.clone();
        tags.extend(self.node_tags.iter().cloned());

        if let Some(host_name) = self.service_host_name() {
            tags.insert(host_name);
        }
        if let Some(host) = self.host(topology) {
            tags.insert(host.name.clone());
        }
        if let Some(rack) = self.rack(topology) {
            tags.insert(rack.name.clone());
        }
        if let Some(dc) = self.data_center(topology) {
            tags.insert(dc.name.clone());
        }

        self.effective_tags = tags;
    }

    pub fn set_user_tags(&mut self, tags: BTreeSet<String>, topology: &Topology) {
        self.user_tags = tags;
        self.rebuild_tags(topology);
    }

    pub fn set_host(&mut self, host: Option<HostId>, topology: &Topology) {
        self.host = host;
        self.rebuild_tags(topology);
    }

    /// Returns the first address whose network name appears in `priority`,
    /// in priority order.
    pub fn compute_default_address<'a>(&'a self, priority: &[String]) -> Option<&'a str> {
        priority
            .iter()
            .find_map(|network| self.addresses.get(network))
            .map(String::as_str)
            .or_else(|| self.addresses.values().next().map(String::as_str))
    }

    /// Walks the per-cell state map; returns `Mixed` on any disagreement
    /// between cells, `Unknown` if no cell has reported yet.
    pub fn compute_aggregated_state(&self) -> NodeState {
        let mut states = self.multicell_states.values();
        let Some(first) = states.next() else {
            return NodeState::Unknown;
        };
        if states.all(|s| s == first) {
            *first
        } else {
            NodeState::Mixed
        }
    }

    /// Recomputes and caches the aggregated state, returning the new value
    /// together with whether it changed (callers emit
    /// `aggregated-state-changed` only on an actual change).
    pub fn refresh_aggregated_state(&mut self) -> (NodeState, bool) {
        let new_state = self.compute_aggregated_state();
        let changed = new_state != self.aggregated_state;
        self.aggregated_state = new_state;
        (new_state, changed)
    }

    /// Initializes the per-cell state map for a freshly-registered node:
    /// `offline` for every tag not yet present, with the local cell's
    /// entry also tracked for O(1) writes through `set_local_state`.
    pub fn init_multicell_states(&mut self, local_cell: CellTag, secondary_cells: &[CellTag]) {
        self.local_cell_tag = Some(local_cell);
        self.multicell_states.entry(local_cell).or_insert(NodeState::Offline);
        for &tag in secondary_cells {
            self.multicell_states.entry(tag).or_insert(NodeState::Offline);
        }
    }

    /// Writes through to the local cell's entry, matching `local_state`.
    pub fn set_local_state(&mut self, state: NodeState) {
        self.local_state = state;
        if let Some(tag) = self.local_cell_tag {
            self.multicell_states.insert(tag, state);
        }
    }

    /// Applies gossip from a secondary cell (used by the primary cell
    /// only; a secondary cell never calls this for its own tag).
    pub fn set_cell_descriptor(&mut self, cell_tag: CellTag, state: NodeState) {
        self.multicell_states.insert(cell_tag, state);
    }

    pub fn stamp_visit_mark(&mut self, medium: MediumIndex, mark: u64) {
        self.visit_marks.insert(medium, mark);
    }

    pub fn visit_mark(&self, medium: MediumIndex) -> Option<u64> {
        self.visit_marks.get(&medium).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_types::MaintenanceRequestId;

    fn node() -> Node {
        Node::new(NodeId::from(1), 4)
    }

    #[test]
    fn fresh_node_has_no_flags_set() {
        let n = node();
        assert!(!n.is_banned());
        assert!(!n.effective_disable_write_sessions());
    }

    #[test]
    fn ban_implies_effective_write_session_disable() {
        let mut n = node();
        n.set_maintenance(MaintenanceRequestId::new(1), MaintenanceKind::Ban);
        assert!(n.is_banned());
        assert!(n.effective_disable_write_sessions());
    }

    #[test]
    fn aggregated_state_is_mixed_on_disagreement() {
        let mut n = node();
        n.init_multicell_states(CellTag::new(0), &[CellTag::new(1)]);
        n.set_local_state(NodeState::Online);
        n.set_cell_descriptor(CellTag::new(1), NodeState::Registered);
        assert_eq!(n.compute_aggregated_state(), NodeState::Mixed);
    }

    #[test]
    fn aggregated_state_agrees_when_all_cells_agree() {
        let mut n = node();
        n.init_multicell_states(CellTag::new(0), &[CellTag::new(1)]);
        n.set_local_state(NodeState::Online);
        n.set_cell_descriptor(CellTag::new(1), NodeState::Online);
        assert_eq!(n.compute_aggregated_state(), NodeState::Online);
    }

    #[test]
    fn refresh_reports_change_only_once() {
        let mut n = node();
        n.init_multicell_states(CellTag::new(0), &[]);
        n.set_local_state(NodeState::Registered);
        let (_, changed) = n.refresh_aggregated_state();
        assert!(changed);
        let (_, changed_again) = n.refresh_aggregated_state();
        assert!(!changed_again);
    }

    #[test]
    fn default_address_prefers_priority_order() {
        let mut n = node();
        n.addresses.insert("fallback".to_string(), "10.0.0.1:1".to_string());
        n.addresses.insert("interconnect".to_string(), "10.0.0.2:1".to_string());
        let priority = vec!["interconnect".to_string(), "fallback".to_string()];
        assert_eq!(n.compute_default_address(&priority), Some("10.0.0.2:1"));
    }

    #[test]
    fn rebuild_tags_folds_in_node_tags_and_the_derived_service_host_name() {
        let topology = Topology::new();
        let mut n = node();
        n.default_address = "node-17.dc.example:9012".to_string();
        n.node_tags.insert("generation:2024".to_string());
        n.user_tags.insert("canary".to_string());
        n.rebuild_tags(&topology);

        assert!(n.tags().contains("node-17.dc.example"));
        assert!(n.tags().contains("generation:2024"));
        assert!(n.tags().contains("canary"));
    }

    #[test]
    fn node_goes_online_only_once_every_required_heartbeat_kind_has_arrived() {
        let mut n = node();
        n.flavors.insert(nt_types::NodeFlavor::Data);
        n.flavors.insert(nt_types::NodeFlavor::Exec);
        assert!(!n.has_received_all_required_heartbeats());

        n.record_heartbeat_kind(NodeHeartbeatKind::Data);
        assert!(!n.has_received_all_required_heartbeats());

        n.record_heartbeat_kind(NodeHeartbeatKind::Exec);
        assert!(n.has_received_all_required_heartbeats());
    }
}
