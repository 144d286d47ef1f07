//! The node registry (C3): owner of every [`Node`] plus the indices that
//! make lookups O(1) and the monotonic node-id allocator.
//!
//! Rack-name, DC-name and topology-host-name lookups go straight through
//! [`nt_topology::Topology`] — the registry only owns indices keyed by
//! things nodes themselves report (address, reported host name, lease
//! transaction).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nt_topology::Topology;
use nt_types::{LeaseTransactionId, NodeId, RackId, MAX_NODE_ID};

use crate::error::{NodeTrackerError, Result};
use crate::node::Node;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: BTreeMap<NodeId, Node>,
    address_index: HashMap<String, NodeId>,
    /// Reported service-host-name → node ids still registered under it.
    /// A multimap (spec §4.3 "host-name→Node(multi)") since more than one
    /// node can share a reported host name during a migration window
    /// (SPEC_FULL §11.7).
    host_name_index: HashMap<String, BTreeSet<NodeId>>,
    lease_index: HashMap<LeaseTransactionId, NodeId>,
    next_node_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn find(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn get_or_throw(&self, id: NodeId) -> Result<&Node> {
        self.find(id).ok_or(NodeTrackerError::NodeNotFound(id))
    }

    pub fn find_by_address(&self, address: &str) -> Option<&Node> {
        self.address_index.get(address).and_then(|id| self.find(*id))
    }

    pub fn find_by_lease(&self, lease: LeaseTransactionId) -> Option<&Node> {
        self.lease_index.get(&lease).and_then(|id| self.find(*id))
    }

    /// Finds any one node reporting `host_name` (spec §4.3's "find/get by
    /// host name (returns any one)"). When more than one node shares a
    /// reported host name, the one with the lowest node id wins
    /// (SPEC_FULL §11.7) — deterministic since `BTreeSet` iterates in
    /// order.
    pub fn find_by_host_name(&self, host_name: &str) -> Option<&Node> {
        self.host_name_index
            .get(host_name)
            .and_then(|ids| ids.iter().next())
            .and_then(|id| self.find(*id))
    }

    /// Deterministic order: sorted by default address. `rack` of `None`
    /// means "nodes with no rack at all" (host unbound, or host bound to
    /// no rack).
    pub fn list_nodes_by_rack<'a>(
        &'a self,
        rack: Option<RackId>,
        topology: &'a Topology,
    ) -> Vec<&'a Node> {
        let mut nodes: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.rack(topology).map(|r| r.id) == rack)
            .collect();
        nodes.sort_by(|a, b| {
            let addr_a = a.addresses().values().next().map(String::as_str).unwrap_or("");
            let addr_b = b.addresses().values().next().map(String::as_str).unwrap_or("");
            addr_a.cmp(addr_b)
        });
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    // ------------------------------------------------------------------
    // Lease-transaction bookkeeping
    // ------------------------------------------------------------------

    /// Maintains the lease-transaction index and the node's own field in
    /// lock-step: invariant 1 in §8 depends on both sides agreeing exactly.
    pub fn register_lease_transaction(&mut self, node_id: NodeId, lease: LeaseTransactionId) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&node_id)
            .ok_or(NodeTrackerError::NodeNotFound(node_id))?;
        node.lease_transaction = Some(lease);
        self.lease_index.insert(lease, node_id);
        Ok(())
    }

    pub fn unregister_lease_transaction(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            if let Some(lease) = node.lease_transaction.take() {
                self.lease_index.remove(&lease);
            }
        }
    }

    // ------------------------------------------------------------------
    // Id allocation and mutation
    // ------------------------------------------------------------------

    /// Monotonic allocator: skips the `INVALID` sentinel, wraps back to
    /// zero past `MAX_NODE_ID`, and never returns an id currently in use.
    /// Wrapping without finding a free slot (pool fully saturated) is a
    /// `LimitReached` error — the bounded state size makes "scan once
    /// around" sufficient.
    pub fn generate_node_id(&mut self) -> Result<NodeId> {
        let start = self.next_node_id;
        loop {
            let candidate = self.next_node_id;
            self.next_node_id = if self.next_node_id >= MAX_NODE_ID {
                0
            } else {
                self.next_node_id + 1
            };

            let id = NodeId::from(candidate);
            if id.is_valid() && !self.nodes.contains_key(&id) {
                return Ok(id);
            }
            if self.next_node_id == start {
                return Err(NodeTrackerError::LimitReached);
            }
        }
    }

    pub fn insert_node(&mut self, node: Node, default_address: String) {
        self.address_index.insert(default_address, node.id);
        if let Some(host_name) = node.service_host_name() {
            self.host_name_index.entry(host_name).or_default().insert(node.id);
        }
        self.nodes.insert(node.id, node);
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        self.address_index.retain(|_, v| *v != id);
        if let Some(host_name) = node.service_host_name() {
            if let Some(ids) = self.host_name_index.get_mut(&host_name) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.host_name_index.remove(&host_name);
                }
            }
        }
        if let Some(lease) = node.lease_transaction {
            self.lease_index.remove(&lease);
        }
        Some(node)
    }

    /// Shrinks every owned hash table after a large burst of removals, per
    /// §4.2 "Shrink". Safe to call at any time; purely a capacity hint.
    pub fn compact(&mut self) {
        self.address_index.shrink_to_fit();
        self.host_name_index.shrink_to_fit();
        self.lease_index.shrink_to_fit();
    }

    // ------------------------------------------------------------------
    // Snapshot restore support (nt-persistence)
    // ------------------------------------------------------------------

    /// High-water mark for [`Self::generate_node_id`]; persisted and
    /// restored verbatim so a reloaded registry never reissues an id that
    /// belonged to a node removed before the snapshot was taken.
    pub fn next_node_id_cursor(&self) -> u32 {
        self.next_node_id
    }

    pub fn set_next_node_id_cursor(&mut self, next: u32) {
        self.next_node_id = next;
    }

    /// Rebuilds `lease_index` from each node's own `lease_transaction`
    /// field. The snapshot format persists that field on the node but not
    /// the index itself, so a loader calls this once after every node has
    /// been inserted.
    pub fn reindex_leases(&mut self) {
        self.lease_index.clear();
        for node in self.nodes.values() {
            if let Some(lease) = node.lease_transaction {
                self.lease_index.insert(lease, node.id);
            }
        }
    }

    /// Rebuilds `host_name_index` from each node's own default address,
    /// the post-snapshot counterpart to [`Self::reindex_leases`] (spec
    /// §4.3).
    pub fn reindex_host_names(&mut self) {
        self.host_name_index.clear();
        for node in self.nodes.values() {
            if let Some(host_name) = node.service_host_name() {
                self.host_name_index.entry(host_name).or_default().insert(node.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_types::NodeId;

    #[test]
    fn generate_node_id_skips_invalid_sentinel_and_in_use() {
        let mut registry = Registry::new();
        registry.insert_node(Node::new(NodeId::from(0), 4), "a1".to_string());
        let id = registry.generate_node_id().unwrap();
        assert_eq!(id, NodeId::from(1));
    }

    #[test]
    fn lease_index_stays_in_lockstep_with_node_field() {
        let mut registry = Registry::new();
        registry.insert_node(Node::new(NodeId::from(1), 4), "a1".to_string());
        registry
            .register_lease_transaction(NodeId::from(1), LeaseTransactionId::new(77))
            .unwrap();

        assert_eq!(
            registry.find_by_lease(LeaseTransactionId::new(77)).unwrap().id,
            NodeId::from(1)
        );

        registry.unregister_lease_transaction(NodeId::from(1));
        assert!(registry.find_by_lease(LeaseTransactionId::new(77)).is_none());
    }

    #[test]
    fn find_by_host_name_returns_the_lowest_node_id_and_survives_reindex() {
        let mut registry = Registry::new();
        let mut low = Node::new(NodeId::from(1), 4);
        low.default_address = "shared-host:9012".to_string();
        registry.insert_node(low, "10.0.0.1:1".to_string());

        let mut high = Node::new(NodeId::from(2), 4);
        high.default_address = "shared-host:9013".to_string();
        registry.insert_node(high, "10.0.0.2:1".to_string());

        assert_eq!(registry.find_by_host_name("shared-host").unwrap().id, NodeId::from(1));

        registry.reindex_host_names();
        assert_eq!(registry.find_by_host_name("shared-host").unwrap().id, NodeId::from(1));
    }

    #[test]
    fn remove_node_clears_every_index() {
        let mut registry = Registry::new();
        registry.insert_node(Node::new(NodeId::from(1), 4), "a1".to_string());
        registry
            .register_lease_transaction(NodeId::from(1), LeaseTransactionId::new(5))
            .unwrap();

        registry.remove_node(NodeId::from(1));

        assert!(registry.find(NodeId::from(1)).is_none());
        assert!(registry.find_by_address("a1").is_none());
        assert!(registry.find_by_lease(LeaseTransactionId::new(5)).is_none());
    }
}
