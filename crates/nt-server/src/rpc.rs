//! RPC request/response types and the handler tying gates, signals and
//! the pure kernel together (C8, spec §4.4/§6).
//!
//! [`NodeTrackerHandler`] owns the registry, topology and configuration
//! the kernel needs plus the concurrency gates and signal bus the kernel
//! itself cannot own (it is pure). Each RPC method acquires its gate,
//! builds a [`Command`], calls [`apply_committed`], publishes the
//! resulting effects as signals, and translates the kernel's
//! [`NodeTrackerError`] into an [`RpcError`].

use std::collections::{BTreeMap, BTreeSet};

use nt_core::{apply_committed, Command, Effect, HeartbeatConfig, NodeTrackerError, Registry, Statistics};
use nt_topology::Topology;
use nt_types::{CellTag, FlavorSet, LeaseTransactionId, NodeHeartbeatKind, NodeId, Timestamp};

use crate::attributes::{
    apply_node_attribute_write, cluster_node_map, read_node_attributes, ClusterNodeMap, NodeAttributeView,
    NodeAttributeWrite,
};
use crate::error::{RpcError, ServerResult};
use crate::gates::{RegistrationGate, RemovalGate, ShardedHeartbeatGate};
use crate::signals::SignalBus;

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub addresses: BTreeMap<String, String>,
    pub flavors: FlavorSet,
    pub user_tags: BTreeSet<String>,
    /// Tags the node reports about itself (spec §3's "node tags"),
    /// carried in the §6 Register request alongside operator-set
    /// `user_tags`.
    pub node_tags: BTreeSet<String>,
    pub statistics: Statistics,
    pub local_cell: CellTag,
    pub secondary_cells: Vec<CellTag>,
    pub network_priority: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisterResponse {
    pub node_id: NodeId,
    pub lease_transaction: LeaseTransactionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullHeartbeatRequest {
    pub node_id: NodeId,
    /// Which of the node's required heartbeat kinds (spec §3) this report
    /// satisfies.
    pub kind: NodeHeartbeatKind,
    pub statistics: Statistics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FullHeartbeatResponse {
    /// This node's rack name, so it can self-report tags consistently
    /// (spec §4.4's "the response carries, for example, this node's rack
    /// name").
    pub rack_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalHeartbeatRequest {
    pub node_id: NodeId,
    pub statistics_delta: Statistics,
    pub alerts: Vec<String>,
    /// Which shard of the per-shard concurrency gate (spec §4.4) this
    /// node's heartbeat is admitted through.
    pub shard: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalHeartbeatResponse {
    pub rack_name: Option<String>,
}

/// Owns every piece of mutable state the node tracker's RPC surface
/// needs: the pure core's own state (`registry`, `topology`), its
/// configuration, the concurrency gates guarding admission, and the
/// signal bus fanning committed effects out to subscribers.
pub struct NodeTrackerHandler {
    registry: Registry,
    topology: Topology,
    config: HeartbeatConfig,
    registration_gate: RegistrationGate,
    removal_gate: RemovalGate,
    heartbeat_gate: ShardedHeartbeatGate,
    signals: SignalBus,
    next_lease_transaction: u64,
    next_maintenance_request: u64,
    /// Cluster-wide startup-safety gate (spec §4.4 step 1): while held,
    /// `register` is rejected outright, before any other precondition
    /// runs.
    provision_lock_held: bool,
}

impl NodeTrackerHandler {
    pub fn new(
        registry: Registry,
        topology: Topology,
        config: HeartbeatConfig,
        max_concurrent_node_unregistrations: u32,
        max_concurrent_incremental_heartbeats_per_shard: u32,
    ) -> Self {
        Self {
            registration_gate: RegistrationGate::new(config.max_concurrent_node_registrations),
            removal_gate: RemovalGate::new(max_concurrent_node_unregistrations),
            heartbeat_gate: ShardedHeartbeatGate::new(max_concurrent_incremental_heartbeats_per_shard),
            registry,
            topology,
            config,
            signals: SignalBus::new(),
            next_lease_transaction: 1,
            next_maintenance_request: 1,
            provision_lock_held: false,
        }
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn crate::signals::SignalSubscriber + Send>) {
        self.signals.subscribe(subscriber);
    }

    /// Raises the provision lock (spec §4.4 step 1): every subsequent
    /// `register` call is rejected with [`RpcError::ProvisionLockHeld`]
    /// until [`Self::unlock_provisioning`] is called.
    pub fn lock_for_provisioning(&mut self) {
        self.provision_lock_held = true;
    }

    pub fn unlock_provisioning(&mut self) {
        self.provision_lock_held = false;
    }

    pub fn provision_lock_held(&self) -> bool {
        self.provision_lock_held
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    fn next_lease_transaction(&mut self) -> LeaseTransactionId {
        let id = LeaseTransactionId::new(self.next_lease_transaction);
        self.next_lease_transaction += 1;
        id
    }

    fn next_maintenance_request(&mut self) -> nt_types::MaintenanceRequestId {
        let id = nt_types::MaintenanceRequestId::new(self.next_maintenance_request);
        self.next_maintenance_request += 1;
        id
    }

    /// RPC: Register (spec §4.4). Rejects with `unavailable` if the
    /// registration gate is saturated before the kernel's own semaphore
    /// proxy ever runs — this is the actual in-flight-mutation count the
    /// kernel cannot track itself.
    pub fn register(&mut self, request: RegisterRequest, timestamp: Timestamp) -> ServerResult<RegisterResponse> {
        if self.provision_lock_held {
            return Err(RpcError::ProvisionLockHeld);
        }

        let _permit = self
            .registration_gate
            .try_acquire()
            .ok_or_else(|| RpcError::Unavailable("registration gate saturated".to_string()))?;

        let default_address = compute_default_address(&request.addresses, &request.network_priority)
            .ok_or_else(|| RpcError::InvalidState("register request carries no addresses".to_string()))?;

        let lease_transaction = self.next_lease_transaction();
        let command = Command::Register {
            default_address,
            addresses: request.addresses,
            flavors: request.flavors,
            user_tags: request.user_tags,
            node_tags: request.node_tags,
            statistics: request.statistics,
            local_cell: request.local_cell,
            secondary_cells: request.secondary_cells,
            lease_transaction,
            timestamp,
        };

        let node_id = self.commit(command)?;
        Ok(RegisterResponse { node_id, lease_transaction })
    }

    /// RPC: FullHeartbeat (spec §4.4).
    pub fn full_heartbeat(&mut self, request: FullHeartbeatRequest, timestamp: Timestamp) -> ServerResult<FullHeartbeatResponse> {
        let command = Command::FullHeartbeat {
            node_id: request.node_id,
            kind: request.kind,
            statistics: request.statistics,
            timestamp,
        };
        self.commit(command)?;
        let rack_name = self
            .registry
            .find(request.node_id)
            .and_then(|n| n.rack(&self.topology))
            .map(|r| r.name.clone());
        Ok(FullHeartbeatResponse { rack_name })
    }

    /// RPC: IncrementalHeartbeat (spec §4.4), admitted through the
    /// per-shard gate named in the request.
    pub fn incremental_heartbeat(
        &mut self,
        request: IncrementalHeartbeatRequest,
        timestamp: Timestamp,
    ) -> ServerResult<IncrementalHeartbeatResponse> {
        let _permit = self
            .heartbeat_gate
            .try_acquire(request.shard)
            .ok_or_else(|| RpcError::Unavailable(format!("incremental heartbeat gate saturated for shard {}", request.shard)))?;

        let command = Command::IncrementalHeartbeat {
            node_id: request.node_id,
            statistics_delta: request.statistics_delta,
            alerts: request.alerts,
            timestamp,
        };
        self.commit(command)?;
        let rack_name = self
            .registry
            .find(request.node_id)
            .and_then(|n| n.rack(&self.topology))
            .map(|r| r.name.clone());
        Ok(IncrementalHeartbeatResponse { rack_name })
    }

    /// Internal mutation: unregister, admitted through the removal gate's
    /// companion semaphore only once the follow-up `RemoveNode` actually
    /// runs; unregister itself is ungated (spec §4.4 gates registration
    /// and removal, not the state transition in between).
    pub fn unregister(&mut self, node_id: NodeId, schedule_removal: bool, timestamp: Timestamp) -> ServerResult<()> {
        self.commit(Command::Unregister { node_id, schedule_removal, timestamp })?;
        Ok(())
    }

    /// Internal mutation: drains one entry from the removal queue once
    /// the removal semaphore admits it.
    pub fn remove_node(&mut self, node_id: NodeId) -> ServerResult<()> {
        let _permit = self
            .removal_gate
            .try_acquire()
            .ok_or_else(|| RpcError::Unavailable("removal gate saturated".to_string()))?;
        self.commit(Command::RemoveNode { node_id })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Topology administration (C1, reached through C8 per spec §4.1: the
    // attribute layer's operator-facing create/rename/reparent/destroy).
    // Each reparent/destroy rebuilds the tags of every node the change
    // touches and emits `ConfigurationRefresh` for the affected hosts, so
    // a subscriber never observes a node with stale ancestor tags.
    // ------------------------------------------------------------------

    pub fn create_data_center(&mut self, name: impl Into<String>) -> ServerResult<nt_types::DataCenterId> {
        Ok(self.topology.create_data_center(name)?)
    }

    pub fn rename_data_center(&mut self, id: nt_types::DataCenterId, new_name: impl Into<String>) -> ServerResult<()> {
        Ok(self.topology.rename_data_center(id, new_name)?)
    }

    pub fn destroy_data_center(&mut self, id: nt_types::DataCenterId) -> ServerResult<()> {
        let affected_racks = self.topology.destroy_data_center(id)?;
        for rack_id in affected_racks {
            self.refresh_rack_nodes(rack_id);
        }
        Ok(())
    }

    pub fn create_rack(
        &mut self,
        name: impl Into<String>,
        data_center: Option<nt_types::DataCenterId>,
    ) -> ServerResult<nt_types::RackId> {
        Ok(self.topology.create_rack(name, data_center)?)
    }

    pub fn rename_rack(&mut self, id: nt_types::RackId, new_name: impl Into<String>) -> ServerResult<()> {
        Ok(self.topology.rename_rack(id, new_name)?)
    }

    /// Rebinds `rack_id` under a different (or no) data center (spec
    /// §4.1's "set-parent"), then rebuilds the tags of every node whose
    /// host sits on that rack (scenario 5: "rack rebind and tag
    /// propagation").
    pub fn set_rack_parent(&mut self, rack_id: nt_types::RackId, data_center: Option<nt_types::DataCenterId>) -> ServerResult<()> {
        let reparented = self.topology.set_rack_parent(rack_id, data_center)?;
        self.refresh_hosts(&reparented.affected_hosts);
        Ok(())
    }

    pub fn destroy_rack(&mut self, id: nt_types::RackId) -> ServerResult<()> {
        let affected_hosts = self.topology.destroy_rack(id)?;
        self.refresh_hosts(&affected_hosts);
        Ok(())
    }

    pub fn create_host(&mut self, name: impl Into<String>, rack: nt_types::RackId) -> ServerResult<nt_types::HostId> {
        Ok(self.topology.create_host(name, rack)?)
    }

    pub fn rename_host(&mut self, id: nt_types::HostId, new_name: impl Into<String>) -> ServerResult<()> {
        Ok(self.topology.rename_host(id, new_name)?)
    }

    pub fn destroy_host(&mut self, id: nt_types::HostId) -> ServerResult<()> {
        Ok(self.topology.destroy_host(id)?)
    }

    /// Binds `node_id` to `host_id`, the reverse direction of the node's
    /// own `host` attribute (spec §3: "A node has at most one host").
    pub fn bind_node_to_host(&mut self, node_id: NodeId, host_id: nt_types::HostId) -> ServerResult<()> {
        self.topology.add_node_to_host(host_id, node_id)?;
        let node = self.registry.find_mut(node_id).ok_or(RpcError::NoSuchNode(node_id))?;
        node.set_host(Some(host_id), &self.topology);
        self.signals.publish(&[Effect::NodeConfigUpdated(node_id)]);
        Ok(())
    }

    fn refresh_rack_nodes(&mut self, rack_id: nt_types::RackId) {
        let host_ids: Vec<nt_types::HostId> =
            self.topology.hosts().filter(|h| h.rack == Some(rack_id)).map(|h| h.id).collect();
        self.refresh_hosts(&host_ids);
    }

    fn refresh_hosts(&mut self, host_ids: &[nt_types::HostId]) {
        let mut touched = Vec::new();
        for &host_id in host_ids {
            let Some(host) = self.topology.host(host_id) else { continue };
            touched.extend(host.members.iter().copied());
        }
        for node_id in &touched {
            if let Some(node) = self.registry.find_mut(*node_id) {
                node.rebuild_tags(&self.topology);
            }
        }
        let mut effects: Vec<Effect> = touched.into_iter().map(Effect::NodeConfigUpdated).collect();
        effects.push(Effect::ConfigurationRefresh { hosts: host_ids.to_vec() });
        self.signals.publish(&effects);
    }

    pub fn read_node_attributes(&self, node_id: NodeId) -> ServerResult<NodeAttributeView> {
        let node = self.registry.find(node_id).ok_or(RpcError::NoSuchNode(node_id))?;
        Ok(read_node_attributes(node, &self.topology))
    }

    /// Synthetic cluster-wide attribute (spec §4.8): computed fresh on
    /// every read rather than kept incrementally in sync, since no
    /// operation needs it hot.
    pub fn cluster_node_map(&self) -> ClusterNodeMap {
        cluster_node_map(&self.registry)
    }

    pub fn write_node_attribute(&mut self, node_id: NodeId, write: NodeAttributeWrite) -> ServerResult<()> {
        let request_id = self.next_maintenance_request();
        apply_node_attribute_write(&mut self.registry, &mut self.topology, node_id, write, || request_id)?;
        self.signals.publish(&[Effect::NodeConfigUpdated(node_id)]);
        Ok(())
    }

    /// Drives one command through the kernel, publishes the resulting
    /// signals, and applies any best-effort post-commit attribute writes.
    /// Returns the mutated node's id on success (the registered node's id
    /// for `Register`, the command's own `node_id` for everything else).
    fn commit(&mut self, command: Command) -> Result<NodeId, NodeTrackerError> {
        let node_id = command_node_id(&command);
        let registry = std::mem::take(&mut self.registry);
        let (registry, effects) = apply_committed(registry, &self.topology, command, &self.config)?;
        self.registry = registry;

        for effect in &effects {
            if let Effect::AttributeTreeTouch { node_id } = effect {
                // Best-effort only (spec §7): the attribute tree's
                // last-seen-time is a read straight through to the
                // node's own field, which the kernel already set, so
                // there is nothing further to fail here. Logged at
                // debug for parity with a real out-of-process write.
                tracing::debug!(%node_id, "attribute tree touch (last-seen-time)");
            }
        }
        self.signals.publish(&effects);

        Ok(node_id.unwrap_or_else(|| {
            effects
                .iter()
                .find_map(|e| match e {
                    Effect::NodeRegistered(id) => Some(*id),
                    _ => None,
                })
                .unwrap_or(NodeId::INVALID)
        }))
    }
}

fn command_node_id(command: &Command) -> Option<NodeId> {
    match command {
        Command::Register { .. } => None,
        Command::FullHeartbeat { node_id, .. }
        | Command::IncrementalHeartbeat { node_id, .. }
        | Command::Unregister { node_id, .. }
        | Command::RemoveNode { node_id } => Some(*node_id),
    }
}

fn compute_default_address(addresses: &BTreeMap<String, String>, priority: &[String]) -> Option<String> {
    priority
        .iter()
        .find_map(|network| addresses.get(network))
        .or_else(|| addresses.values().next())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(address: &str) -> RegisterRequest {
        let mut addresses = BTreeMap::new();
        addresses.insert("default".to_string(), address.to_string());
        RegisterRequest {
            addresses,
            flavors: FlavorSet::empty(),
            user_tags: BTreeSet::new(),
            node_tags: BTreeSet::new(),
            statistics: Statistics::default(),
            local_cell: CellTag::new(0),
            secondary_cells: Vec::new(),
            network_priority: vec!["default".to_string()],
        }
    }

    fn handler() -> NodeTrackerHandler {
        NodeTrackerHandler::new(Registry::new(), Topology::new(), HeartbeatConfig::default(), 256, 64)
    }

    #[test]
    fn register_then_full_heartbeat_then_incremental() {
        let mut handler = handler();
        let response = handler.register(request("10.0.0.1:1"), Timestamp::from_micros(1)).unwrap();
        assert_eq!(response.node_id, handler.registry().find_by_address("10.0.0.1:1").unwrap().id);

        handler
            .full_heartbeat(
                FullHeartbeatRequest {
                    node_id: response.node_id,
                    kind: NodeHeartbeatKind::Data,
                    statistics: Statistics::default(),
                },
                Timestamp::from_micros(2),
            )
            .unwrap();
        assert_eq!(handler.registry().find(response.node_id).unwrap().local_state(), nt_types::NodeState::Online);

        handler
            .incremental_heartbeat(
                IncrementalHeartbeatRequest {
                    node_id: response.node_id,
                    statistics_delta: Statistics::default(),
                    alerts: vec!["disk-full".to_string()],
                    shard: 0,
                },
                Timestamp::from_micros(3),
            )
            .unwrap();
        assert_eq!(handler.registry().find(response.node_id).unwrap().alerts(), &["disk-full".to_string()]);
    }

    #[test]
    fn register_is_rejected_while_the_provision_lock_is_held() {
        let mut handler = handler();
        handler.lock_for_provisioning();
        let err = handler.register(request("10.0.0.1:1"), Timestamp::from_micros(1)).unwrap_err();
        assert!(matches!(err, RpcError::ProvisionLockHeld));

        handler.unlock_provisioning();
        handler.register(request("10.0.0.1:1"), Timestamp::from_micros(1)).unwrap();
    }

    #[test]
    fn registration_gate_rejects_once_saturated() {
        let mut handler = NodeTrackerHandler::new(
            Registry::new(),
            Topology::new(),
            HeartbeatConfig { max_concurrent_node_registrations: 0, ..HeartbeatConfig::default() },
            256,
            64,
        );
        let err = handler.register(request("10.0.0.1:1"), Timestamp::from_micros(1)).unwrap_err();
        assert!(matches!(err, RpcError::Unavailable(_)));
    }

    #[test]
    fn write_then_read_node_attribute_round_trips() {
        let mut handler = handler();
        let response = handler.register(request("10.0.0.1:1"), Timestamp::from_micros(1)).unwrap();
        handler.write_node_attribute(response.node_id, NodeAttributeWrite::Banned(true)).unwrap();
        let view = handler.read_node_attributes(response.node_id).unwrap();
        assert!(view.banned);
    }

    /// Scenario 5 (spec §8): rack rebind propagates into a node's tags.
    #[test]
    fn moving_a_rack_to_a_new_data_center_refreshes_bound_nodes_tags() {
        let mut handler = handler();
        let dc_a = handler.create_data_center("dc-a").unwrap();
        let rack = handler.create_rack("rack-a", Some(dc_a)).unwrap();
        let host = handler.create_host("host-a", rack).unwrap();

        let response = handler.register(request("10.0.0.1:1"), Timestamp::from_micros(1)).unwrap();
        handler.bind_node_to_host(response.node_id, host).unwrap();
        let view = handler.read_node_attributes(response.node_id).unwrap();
        assert!(view.tags.contains("rack-a"));
        assert!(view.tags.contains("dc-a"));

        let dc_b = handler.create_data_center("dc-b").unwrap();
        handler.set_rack_parent(rack, Some(dc_b)).unwrap();

        let view = handler.read_node_attributes(response.node_id).unwrap();
        assert!(view.tags.contains("dc-b"));
        assert!(!view.tags.contains("dc-a"));
    }

    #[test]
    fn destroying_a_rack_unbinds_its_hosts_nodes() {
        let mut handler = handler();
        let rack = handler.create_rack("rack-a", None).unwrap();
        let host = handler.create_host("host-a", rack).unwrap();
        let response = handler.register(request("10.0.0.1:1"), Timestamp::from_micros(1)).unwrap();
        handler.bind_node_to_host(response.node_id, host).unwrap();

        handler.destroy_rack(rack).unwrap();

        let view = handler.read_node_attributes(response.node_id).unwrap();
        assert!(!view.tags.contains("rack-a"));
        assert!(view.rack.is_none());
    }
}
