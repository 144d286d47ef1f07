//! Snapshot field extraction for versioned persistence (nt-persistence).
//!
//! `nt-persistence` never reaches into [`Node`]'s private fields; it goes
//! through [`NodeSnapshot`] the same way any external caller mutates a node
//! only through [`crate::registry::Registry`]. Replica bookkeeping is
//! reduced to an approved-replica count per medium: the chunk manager owns
//! the authoritative chunk-to-node mapping and reinserts the actual replica
//! sets from it after load, so a freshly-restored node's
//! [`crate::replication::ReplicaBookkeeping`] is reserved but empty.

use std::collections::{BTreeMap, BTreeSet};

use nt_types::{
    CellTag, FlavorSet, HostId, LeaseTransactionId, MaintenanceKind, MaintenanceRequestId,
    MediumIndex, NodeHeartbeatKind, NodeId, NodeState, Timestamp,
};
use serde::{Deserialize, Serialize};

use crate::heartbeat::Statistics;
use crate::node::Node;
use crate::replication::ReplicaBookkeeping;

/// Every field of a [`Node`] that survives a snapshot round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub default_address: String,
    pub addresses: BTreeMap<String, String>,
    pub flavors: FlavorSet,
    pub heartbeats_received: BTreeSet<NodeHeartbeatKind>,
    pub user_tags: BTreeSet<String>,
    pub node_tags: BTreeSet<String>,
    pub host: Option<HostId>,
    pub local_state: NodeState,
    pub aggregated_state: NodeState,
    pub multicell_states: BTreeMap<CellTag, NodeState>,
    pub local_cell_tag: Option<CellTag>,
    pub lease_transaction: Option<LeaseTransactionId>,
    pub maintenance_requests: BTreeMap<MaintenanceRequestId, MaintenanceKind>,
    pub statistics: Statistics,
    pub alerts: Vec<String>,
    pub register_time: Timestamp,
    pub last_seen_time: Timestamp,
    pub visit_marks: BTreeMap<MediumIndex, u64>,
    /// Approved-replica count by medium; see the module doc comment.
    pub approved_replica_counts_by_medium: BTreeMap<MediumIndex, u32>,
    pub replication_priority_count: usize,
    pub resource_limits_overrides: BTreeMap<String, u64>,
}

impl Node {
    pub fn to_snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id,
            default_address: self.default_address.clone(),
            addresses: self.addresses.clone(),
            flavors: self.flavors,
            heartbeats_received: self.heartbeats_received.clone(),
            user_tags: self.user_tags.clone(),
            node_tags: self.node_tags.clone(),
            host: self.host,
            local_state: self.local_state,
            aggregated_state: self.aggregated_state,
            multicell_states: self.multicell_states.clone(),
            local_cell_tag: self.local_cell_tag,
            lease_transaction: self.lease_transaction,
            maintenance_requests: self.maintenance_requests.clone(),
            statistics: self.statistics.clone(),
            alerts: self.alerts.clone(),
            register_time: self.register_time,
            last_seen_time: self.last_seen_time,
            visit_marks: self.visit_marks.clone(),
            approved_replica_counts_by_medium: self.replicas.approved_counts_by_medium(),
            replication_priority_count: self.replicas.priority_count(),
            resource_limits_overrides: self.resource_limits_overrides.clone(),
        }
    }

    /// Rebuilds a node from a snapshot. `effective_tags` is left empty —
    /// the caller rebuilds it via [`Node::rebuild_tags`] once the topology
    /// has been loaded alongside the registry.
    pub fn from_snapshot(snapshot: NodeSnapshot) -> Self {
        Self {
            id: snapshot.id,
            default_address: snapshot.default_address,
            addresses: snapshot.addresses,
            flavors: snapshot.flavors,
            heartbeats_received: snapshot.heartbeats_received,
            user_tags: snapshot.user_tags,
            node_tags: snapshot.node_tags,
            effective_tags: BTreeSet::new(),
            host: snapshot.host,
            local_state: snapshot.local_state,
            multicell_states: snapshot.multicell_states,
            local_cell_tag: snapshot.local_cell_tag,
            aggregated_state: snapshot.aggregated_state,
            lease_transaction: snapshot.lease_transaction,
            maintenance_requests: snapshot.maintenance_requests,
            statistics: snapshot.statistics,
            alerts: snapshot.alerts,
            register_time: snapshot.register_time,
            last_seen_time: snapshot.last_seen_time,
            visit_marks: snapshot.visit_marks,
            replicas: ReplicaBookkeeping::new(snapshot.replication_priority_count),
            resource_limits_overrides: snapshot.resource_limits_overrides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_types::ChunkId;
    use nt_types::ReplicaIndex;

    #[test]
    fn snapshot_round_trip_preserves_fields_but_reserves_replicas() {
        let mut node = Node::new(NodeId::from(1), 4);
        node.addresses.insert("default".to_string(), "10.0.0.1:1".to_string());
        node.init_multicell_states(CellTag::new(0), &[CellTag::new(1)]);
        node.set_local_state(NodeState::Online);
        node.replicas_mut()
            .add_approved_replica((ChunkId::new(1), ReplicaIndex::new(0), MediumIndex::new(0)));

        let snapshot = node.to_snapshot();
        assert_eq!(snapshot.approved_replica_counts_by_medium.get(&MediumIndex::new(0)), Some(&1));

        let restored = Node::from_snapshot(snapshot);
        assert_eq!(restored.local_state(), NodeState::Online);
        assert_eq!(restored.addresses().get("default").map(String::as_str), Some("10.0.0.1:1"));
        assert_eq!(restored.replicas().approved_count(), 0);
    }
}
