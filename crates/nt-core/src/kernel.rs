//! The kernel (C4) - pure functional core of the node tracker.
//!
//! The kernel applies committed commands to produce new state and effects.
//! It is completely pure: no IO, no clocks, no randomness. Every timestamp
//! and every lease handle is supplied by the caller, which makes replaying a
//! command log against a snapshot deterministic.
//!
//! # Example
//!
//! ```ignore
//! let (registry, effects) = apply_committed(registry, &topology, cmd, &config)?;
//! // Caller dispatches effects to subscribers...
//! ```

use nt_types::NodeState;
use nt_topology::Topology;

use crate::effects::Effect;
use crate::error::{NodeTrackerError, Result};
use crate::heartbeat::{Command, HeartbeatConfig};
use crate::node::Node;
use crate::registry::Registry;

/// Applies a committed command to the registry, producing new state and effects.
///
/// Takes ownership of `registry`, returns the new one. Topology is read-only
/// here: heartbeat commands never create or move topology entities, they
/// only read a node's existing host binding to rebuild its tag set.
pub fn apply_committed(
    mut registry: Registry,
    topology: &Topology,
    cmd: Command,
    config: &HeartbeatConfig,
) -> Result<(Registry, Vec<Effect>)> {
    let mut effects = Vec::new();

    match cmd {
        Command::Register {
            default_address,
            addresses,
            flavors,
            user_tags,
            node_tags,
            statistics,
            local_cell,
            secondary_cells,
            lease_transaction,
            timestamp,
        } => {
            // A matching node record still carrying the ban maintenance
            // flag rejects the registration outright rather than being
            // kicked out; the ban survives until explicitly lifted.
            if let Some(existing) = registry.find_by_address(&default_address) {
                if existing.is_banned() {
                    return Err(NodeTrackerError::Banned(existing.id));
                }
            }

            // Registration semaphore: the kernel has no notion of
            // in-flight mutations (it is pure), so it uses the registered
            // node count as the closest proxy for "capacity already
            // spoken for" available to it.
            if registry.len() as u32 >= config.max_concurrent_node_registrations {
                return Err(NodeTrackerError::Unavailable(
                    "registration semaphore saturated".to_string(),
                ));
            }

            // Address-conflict kick-out: a node already holding this default
            // address is unregistered and removed, in that order, before the
            // new node is created.
            if let Some(existing) = registry.find_by_address(&default_address) {
                let old_id = existing.id;
                if let Some(old_node) = registry.find_mut(old_id) {
                    old_node.set_local_state(NodeState::Unregistered);
                }
                effects.push(Effect::NodeUnregistered(old_id));
                registry.remove_node(old_id);
                effects.push(Effect::NodeRemoved(old_id));
            }

            let id = registry.generate_node_id()?;
            let mut node = Node::new(id, config.replication_priority_count);
            node.default_address = default_address.clone();
            node.addresses = addresses;
            node.flavors = flavors;
            node.user_tags = user_tags;
            node.node_tags = node_tags;
            node.statistics = statistics;
            node.register_time = timestamp;
            node.last_seen_time = timestamp;
            node.init_multicell_states(local_cell, &secondary_cells);
            node.set_local_state(NodeState::Registered);
            node.rebuild_tags(topology);

            // Postcondition: the new node carries the id the registry just
            // allocated for it, before it is read back out.
            assert_eq!(node.id, id, "registered node must carry the allocated id");
            debug_assert_eq!(node.local_state(), NodeState::Registered);

            registry.insert_node(node, default_address);
            registry.register_lease_transaction(id, lease_transaction)?;

            effects.push(Effect::NodeRegistered(id));
            effects.push(Effect::LeaseTimeoutSet {
                node_id: id,
                timeout_ms: config.registered_node_timeout_ms,
            });

            // Postcondition: the node is now reachable by id.
            debug_assert!(registry.find(id).is_some());

            Ok((registry, effects))
        }

        Command::FullHeartbeat {
            node_id,
            kind,
            statistics,
            timestamp,
        } => {
            let node = registry
                .find_mut(node_id)
                .ok_or(NodeTrackerError::NodeNotFound(node_id))?;

            // Precondition: a full heartbeat only ever arrives for a node
            // still waiting to come online.
            if node.local_state() != NodeState::Registered {
                return Err(NodeTrackerError::InvalidState {
                    node_id,
                    message: format!(
                        "full heartbeat requires state registered, found {}",
                        node.local_state()
                    ),
                });
            }

            node.statistics = statistics.clone();
            node.last_seen_time = timestamp;
            node.record_heartbeat_kind(kind);

            // Online-gating (spec §3/§4.4): the node only transitions once
            // every heartbeat kind its flavors require has been received at
            // least once. A node with no flavors has nothing left to wait
            // for, so its first full heartbeat already satisfies this.
            let now_online = node.has_received_all_required_heartbeats();
            if now_online {
                node.set_local_state(NodeState::Online);
            }
            let (new_state, changed) = node.refresh_aggregated_state();

            effects.push(Effect::FullHeartbeat { node_id, statistics });
            if changed {
                effects.push(Effect::AggregatedStateChanged { node_id, new_state });
            }
            effects.push(Effect::LeaseTimeoutSet {
                node_id,
                timeout_ms: if now_online {
                    config.online_node_timeout_ms
                } else {
                    config.registered_node_timeout_ms
                },
            });

            Ok((registry, effects))
        }

        Command::IncrementalHeartbeat {
            node_id,
            statistics_delta,
            alerts,
            timestamp,
        } => {
            let node = registry
                .find_mut(node_id)
                .ok_or(NodeTrackerError::NodeNotFound(node_id))?;

            // Precondition: incremental heartbeats are only meaningful once
            // the node has already completed its full heartbeat.
            if node.local_state() != NodeState::Online {
                return Err(NodeTrackerError::InvalidState {
                    node_id,
                    message: format!(
                        "incremental heartbeat requires state online, found {}",
                        node.local_state()
                    ),
                });
            }

            node.statistics.merge(&statistics_delta);
            node.alerts = alerts.clone();
            node.last_seen_time = timestamp;

            effects.push(Effect::IncrementalHeartbeat { node_id, alerts });
            effects.push(Effect::LeaseTimeoutSet {
                node_id,
                timeout_ms: config.online_node_timeout_ms,
            });

            Ok((registry, effects))
        }

        Command::Unregister {
            node_id,
            schedule_removal,
            timestamp,
        } => {
            let node = registry
                .find_mut(node_id)
                .ok_or(NodeTrackerError::NodeNotFound(node_id))?;
            let state = node.local_state();

            // Precondition: only a live node can be unregistered.
            if state != NodeState::Registered && state != NodeState::Online {
                return Err(NodeTrackerError::InvalidState {
                    node_id,
                    message: format!("unregister requires registered or online, found {state}"),
                });
            }

            node.set_local_state(NodeState::Unregistered);
            node.last_seen_time = timestamp;
            let (new_state, changed) = node.refresh_aggregated_state();
            registry.unregister_lease_transaction(node_id);

            // Scheduling the follow-up removal is the caller's concern: the
            // removal queue and its admission semaphore live outside the
            // pure kernel, since a single commit only ever performs one
            // state transition.
            let _ = schedule_removal;

            effects.push(Effect::NodeUnregistered(node_id));
            if changed {
                effects.push(Effect::AggregatedStateChanged { node_id, new_state });
            }

            Ok((registry, effects))
        }

        Command::RemoveNode { node_id } => {
            let node = registry.get_or_throw(node_id)?;

            // Precondition: a node can only be erased once fully drained.
            if node.local_state() != NodeState::Unregistered {
                return Err(NodeTrackerError::InvalidState {
                    node_id,
                    message: format!("remove requires unregistered, found {}", node.local_state()),
                });
            }

            registry.remove_node(node_id);

            // Postcondition: the node is gone from every index.
            debug_assert!(registry.find(node_id).is_none());

            Ok((registry, vec![Effect::NodeRemoved(node_id)]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_types::{CellTag, FlavorSet, LeaseTransactionId, NodeHeartbeatKind, Timestamp};
    use std::collections::{BTreeMap, BTreeSet};

    use crate::heartbeat::Statistics;

    fn register_cmd(address: &str) -> Command {
        let mut addresses = BTreeMap::new();
        addresses.insert("default".to_string(), address.to_string());
        Command::Register {
            default_address: address.to_string(),
            addresses,
            flavors: FlavorSet::empty(),
            user_tags: BTreeSet::new(),
            node_tags: BTreeSet::new(),
            statistics: Statistics::default(),
            local_cell: CellTag::new(0),
            secondary_cells: vec![],
            lease_transaction: LeaseTransactionId::new(1),
            timestamp: Timestamp::from_micros(1),
        }
    }

    #[test]
    fn register_creates_a_node_in_registered_state() {
        let topology = Topology::new();
        let config = HeartbeatConfig::default();
        let (registry, effects) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();

        assert_eq!(registry.len(), 1);
        let node = registry.find_by_address("10.0.0.1:1").unwrap();
        assert_eq!(node.local_state(), NodeState::Registered);
        assert!(matches!(effects[0], Effect::NodeRegistered(_)));
    }

    #[test]
    fn full_then_incremental_heartbeat_reaches_online_and_merges_stats() {
        let topology = Topology::new();
        let config = HeartbeatConfig::default();
        let (registry, _) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();
        let node_id = registry.find_by_address("10.0.0.1:1").unwrap().id;

        let mut stats = Statistics::default();
        stats.resource_usage.insert("cpu".to_string(), 4);
        let (registry, effects) = apply_committed(
            registry,
            &topology,
            Command::FullHeartbeat {
                node_id,
                kind: NodeHeartbeatKind::Data,
                statistics: stats,
                timestamp: Timestamp::from_micros(2),
            },
            &config,
        )
        .unwrap();
        assert_eq!(registry.find(node_id).unwrap().local_state(), NodeState::Online);
        assert!(effects.iter().any(|e| matches!(e, Effect::FullHeartbeat { .. })));

        let mut delta = Statistics::default();
        delta.resource_usage.insert("cpu".to_string(), 8);
        let (registry, _) = apply_committed(
            registry,
            &topology,
            Command::IncrementalHeartbeat {
                node_id,
                statistics_delta: delta,
                alerts: vec!["disk full".to_string()],
                timestamp: Timestamp::from_micros(3),
            },
            &config,
        )
        .unwrap();
        let node = registry.find(node_id).unwrap();
        assert_eq!(node.statistics().resource_usage.get("cpu"), Some(&8));
        assert_eq!(node.alerts(), ["disk full".to_string()]);
    }

    #[test]
    fn incremental_heartbeat_before_full_is_rejected() {
        let topology = Topology::new();
        let config = HeartbeatConfig::default();
        let (registry, _) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();
        let node_id = registry.find_by_address("10.0.0.1:1").unwrap().id;

        let err = apply_committed(
            registry,
            &topology,
            Command::IncrementalHeartbeat {
                node_id,
                statistics_delta: Statistics::default(),
                alerts: vec![],
                timestamp: Timestamp::from_micros(2),
            },
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, NodeTrackerError::InvalidState { .. }));
    }

    #[test]
    fn registering_over_an_existing_address_kicks_out_the_old_node() {
        let topology = Topology::new();
        let config = HeartbeatConfig::default();
        let (registry, _) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();
        let old_id = registry.find_by_address("10.0.0.1:1").unwrap().id;

        let (registry, effects) =
            apply_committed(registry, &topology, register_cmd("10.0.0.1:1"), &config).unwrap();

        assert_eq!(registry.len(), 1);
        let new_id = registry.find_by_address("10.0.0.1:1").unwrap().id;
        assert_ne!(old_id, new_id);
        assert_eq!(
            effects,
            vec![
                Effect::NodeUnregistered(old_id),
                Effect::NodeRemoved(old_id),
                Effect::NodeRegistered(new_id),
                Effect::LeaseTimeoutSet {
                    node_id: new_id,
                    timeout_ms: config.registered_node_timeout_ms,
                },
            ]
        );
    }

    #[test]
    fn registering_over_a_banned_address_is_rejected_and_leaves_the_node_in_place() {
        use nt_types::{MaintenanceKind, MaintenanceRequestId};

        let topology = Topology::new();
        let config = HeartbeatConfig::default();
        let (mut registry, _) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();
        let node_id = registry.find_by_address("10.0.0.1:1").unwrap().id;
        registry
            .find_mut(node_id)
            .unwrap()
            .set_maintenance(MaintenanceRequestId::new(1), MaintenanceKind::Ban);

        let err =
            apply_committed(registry, &topology, register_cmd("10.0.0.1:1"), &config).unwrap_err();
        assert_eq!(err, NodeTrackerError::Banned(node_id));
    }

    #[test]
    fn register_fails_unavailable_once_the_registration_semaphore_is_saturated() {
        let topology = Topology::new();
        let config = HeartbeatConfig {
            max_concurrent_node_registrations: 1,
            ..HeartbeatConfig::default()
        };
        let (registry, _) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();

        let err =
            apply_committed(registry, &topology, register_cmd("10.0.0.2:1"), &config).unwrap_err();
        assert!(matches!(err, NodeTrackerError::Unavailable(_)));
    }

    #[test]
    fn unregister_then_remove_erases_the_node() {
        let topology = Topology::new();
        let config = HeartbeatConfig::default();
        let (registry, _) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();
        let node_id = registry.find_by_address("10.0.0.1:1").unwrap().id;

        let (registry, _) = apply_committed(
            registry,
            &topology,
            Command::Unregister {
                node_id,
                schedule_removal: true,
                timestamp: Timestamp::from_micros(2),
            },
            &config,
        )
        .unwrap();
        assert_eq!(registry.find(node_id).unwrap().local_state(), NodeState::Unregistered);

        let (registry, effects) =
            apply_committed(registry, &topology, Command::RemoveNode { node_id }, &config).unwrap();
        assert!(registry.find(node_id).is_none());
        assert_eq!(effects, vec![Effect::NodeRemoved(node_id)]);
    }

    #[test]
    fn remove_before_unregister_is_rejected() {
        let topology = Topology::new();
        let config = HeartbeatConfig::default();
        let (registry, _) =
            apply_committed(Registry::new(), &topology, register_cmd("10.0.0.1:1"), &config).unwrap();
        let node_id = registry.find_by_address("10.0.0.1:1").unwrap().id;

        let err =
            apply_committed(registry, &topology, Command::RemoveNode { node_id }, &config).unwrap_err();
        assert!(matches!(err, NodeTrackerError::InvalidState { .. }));
    }
}
