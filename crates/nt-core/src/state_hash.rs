//! Deterministic state hashing for the registry and topology.
//!
//! # Purpose
//!
//! - **Determinism validation**: the same committed log replayed on two
//!   replicas must produce identical hashes at every offset.
//! - **Snapshot verification**: a save/load round trip must reproduce the
//!   hash it started with.
//!
//! # Algorithm
//!
//! BLAKE3 over every node (sorted by [`NodeId`](nt_types::NodeId), since
//! [`Registry`] stores them in a `BTreeMap`) followed by every topology
//! entity, sorted by id. Order is critical for determinism.

use blake3::Hasher;
use nt_topology::Topology;

use crate::registry::Registry;

impl Registry {
    /// Computes a deterministic hash of the registry plus the topology it
    /// references. Two replicas with the same committed log must agree on
    /// this hash at every offset.
    pub fn compute_state_hash(&self, topology: &Topology) -> [u8; 32] {
        let mut hasher = Hasher::new();

        hasher.update(&(self.len() as u64).to_le_bytes());
        for node in self.iter() {
            hasher.update(&u32::from(node.id).to_le_bytes());
            hasher.update(&[node.local_state() as u8]);
            hasher.update(&[node.aggregated_state() as u8]);
            for (network, address) in node.addresses() {
                hasher.update(network.as_bytes());
                hasher.update(address.as_bytes());
            }
            for tag in node.tags() {
                hasher.update(tag.as_bytes());
            }
            hasher.update(&node.replicas().approved_count().to_le_bytes());
        }

        let mut data_centers: Vec<_> = topology.data_centers().collect();
        data_centers.sort_by_key(|dc| dc.id.get());
        hasher.update(&(data_centers.len() as u64).to_le_bytes());
        for dc in data_centers {
            hasher.update(&dc.id.get().to_le_bytes());
            hasher.update(dc.name.as_bytes());
        }

        let mut racks: Vec<_> = topology.racks().collect();
        racks.sort_by_key(|r| r.id.get());
        hasher.update(&(racks.len() as u64).to_le_bytes());
        for rack in racks {
            hasher.update(&rack.id.get().to_le_bytes());
            hasher.update(rack.name.as_bytes());
            hasher.update(&[rack.index.get()]);
            hasher.update(&rack.data_center.map_or(u16::MAX, |d| d.get()).to_le_bytes());
        }

        let mut hosts: Vec<_> = topology.hosts().collect();
        hosts.sort_by_key(|h| h.id.get());
        hasher.update(&(hosts.len() as u64).to_le_bytes());
        for host in hosts {
            hasher.update(&host.id.get().to_le_bytes());
            hasher.update(host.name.as_bytes());
            hasher.update(&host.rack.map_or(u32::MAX, |r| r.get()).to_le_bytes());
        }

        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use nt_types::NodeId;

    use super::*;
    use crate::node::Node;

    #[test]
    fn empty_registry_hash_is_deterministic() {
        let topology = Topology::new();
        let a = Registry::new().compute_state_hash(&topology);
        let b = Registry::new().compute_state_hash(&topology);
        assert_eq!(a, b);
    }

    #[test]
    fn adding_a_node_changes_the_hash() {
        let topology = Topology::new();
        let empty_hash = Registry::new().compute_state_hash(&topology);

        let mut registry = Registry::new();
        registry.insert_node(Node::new(NodeId::from(1), 4), "10.0.0.1:1".to_string());
        let with_node_hash = registry.compute_state_hash(&topology);

        assert_ne!(empty_hash, with_node_hash);
    }

    #[test]
    fn hash_is_stable_across_repeated_calls() {
        let topology = Topology::new();
        let mut registry = Registry::new();
        registry.insert_node(Node::new(NodeId::from(1), 4), "10.0.0.1:1".to_string());

        let h1 = registry.compute_state_hash(&topology);
        let h2 = registry.compute_state_hash(&topology);
        assert_eq!(h1, h2);
    }
}
