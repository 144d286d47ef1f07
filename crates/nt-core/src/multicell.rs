//! Multicell state aggregation (C6).
//!
//! Most of the per-node mechanics already live on [`crate::node::Node`]
//! (`init_multicell_states`, `set_local_state`, `set_cell_descriptor`,
//! `refresh_aggregated_state`) since they only ever touch one node at a
//! time. This module is the entry point for applying a secondary cell's
//! *entire* gossip payload — one state per node it knows about — to the
//! primary cell's registry in one pass.

use nt_types::{CellTag, NodeId, NodeState};

use crate::effects::Effect;
use crate::registry::Registry;

/// One node's reported state as gossiped by a secondary cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellNodeDescriptor {
    pub node_id: NodeId,
    pub state: NodeState,
}

/// Applies an entire secondary cell's gossip payload to the registry,
/// refreshing each touched node's aggregated state and returning the
/// effects for nodes whose aggregated state actually changed. Entries for
/// nodes the primary cell doesn't know about are silently skipped — the
/// secondary cell may be ahead or behind the primary's view of the
/// registry, and a stale/future node id is not itself an error here.
pub fn apply_cell_gossip(
    registry: &mut Registry,
    cell_tag: CellTag,
    descriptors: &[CellNodeDescriptor],
) -> Vec<Effect> {
    let mut effects = Vec::new();
    for descriptor in descriptors {
        let Some(node) = registry.find_mut(descriptor.node_id) else {
            continue;
        };
        node.set_cell_descriptor(cell_tag, descriptor.state);
        let (new_state, changed) = node.refresh_aggregated_state();
        if changed {
            effects.push(Effect::AggregatedStateChanged {
                node_id: descriptor.node_id,
                new_state,
            });
        }
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn gossip_for_an_unknown_node_is_skipped_not_errored() {
        let mut registry = Registry::new();
        let effects = apply_cell_gossip(
            &mut registry,
            CellTag::new(1),
            &[CellNodeDescriptor {
                node_id: NodeId::from(42),
                state: NodeState::Online,
            }],
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn gossip_updates_aggregated_state_and_reports_the_change() {
        let mut registry = Registry::new();
        let mut node = Node::new(NodeId::from(1), 4);
        node.init_multicell_states(CellTag::new(0), &[CellTag::new(1)]);
        node.set_local_state(NodeState::Online);
        registry.insert_node(node, "10.0.0.1:1".to_string());

        let effects = apply_cell_gossip(
            &mut registry,
            CellTag::new(1),
            &[CellNodeDescriptor {
                node_id: NodeId::from(1),
                state: NodeState::Registered,
            }],
        );

        assert_eq!(
            effects,
            vec![Effect::AggregatedStateChanged {
                node_id: NodeId::from(1),
                new_state: NodeState::Mixed,
            }]
        );
    }
}
