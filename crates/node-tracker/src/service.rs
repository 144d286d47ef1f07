//! [`NodeTrackerService`]: the facade's single entry point.
//!
//! Mirrors the teacher crate's top-level `Kimberlite::open`/`submit`
//! shape — one struct owning every layer's state, `open` recovering it
//! from disk, request methods driving the mutation pipeline and
//! forwarding its effects as signals. It diverges from the teacher on
//! one point deliberately: spec §5 mandates a single-threaded cooperative
//! automaton with *no* internal locking, so this is a plain owned struct
//! with `&mut self` methods rather than the teacher's `Arc<RwLock<..>>` —
//! the embedder owns exclusive access and serializes calls itself (e.g.
//! from one executor task), the same contract the real master cell's
//! automaton thread provides.

use std::path::{Path, PathBuf};

use nt_config::NodeTrackerConfig;
use nt_core::{HeartbeatConfig, Registry};
use nt_persistence::SnapshotStore;
use nt_server::{
    ClusterNodeMap, FullHeartbeatRequest, FullHeartbeatResponse, IncrementalHeartbeatRequest,
    IncrementalHeartbeatResponse, NodeAttributeView, NodeAttributeWrite, NodeTrackerHandler,
    RegisterRequest, RegisterResponse, SignalSubscriber,
};
use nt_topology::Topology;
use nt_types::{DataCenterId, HostId, NodeId, RackId, Timestamp};

use crate::error::Result;

/// Owns the pure core's state (through [`NodeTrackerHandler`]) plus the
/// snapshot store used to recover and persist it. No RPC transport lives
/// here (spec §1 Non-goals) — an embedder decodes wire requests into the
/// `*Request` types re-exported from `nt_server` and calls the matching
/// method below.
pub struct NodeTrackerService {
    handler: NodeTrackerHandler,
    config: NodeTrackerConfig,
    snapshots: Option<SnapshotStore>,
}

impl NodeTrackerService {
    /// Opens (or initializes) a node tracker rooted at `data_dir`,
    /// recovering the latest snapshot if one exists. Configuration is
    /// loaded from the same directory per `nt_config`'s layered-loader
    /// precedence (spec §10.3).
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let config = NodeTrackerConfig::load_from_dir(&data_dir)?;
        Self::open_with_config(data_dir, config)
    }

    /// Opens with an explicitly supplied configuration, bypassing the
    /// layered file/env loader — useful for tests and for embedders that
    /// already own their own configuration pipeline.
    pub fn open_with_config(data_dir: impl AsRef<Path>, config: NodeTrackerConfig) -> Result<Self> {
        let snapshot_dir: PathBuf = data_dir.as_ref().join("snapshots");
        let snapshots = SnapshotStore::open(snapshot_dir)?;

        let (registry, topology) = match snapshots.load_latest()? {
            Some(decoded) => {
                tracing::info!(nodes = decoded.registry.len(), "recovered node tracker snapshot");
                (decoded.registry, decoded.topology)
            }
            None => {
                tracing::info!("no prior snapshot found; starting with an empty registry");
                (Registry::new(), Topology::new())
            }
        };

        Ok(Self::from_parts(registry, topology, config, Some(snapshots)))
    }

    /// An ephemeral node tracker with no backing snapshot directory —
    /// exercised by tests and by embedders that persist through some
    /// other mechanism (e.g. driving the consensus/mutation engine
    /// directly, per spec §1 Out of scope).
    pub fn in_memory(config: NodeTrackerConfig) -> Self {
        Self::from_parts(Registry::new(), Topology::new(), config, None)
    }

    fn from_parts(
        registry: Registry,
        topology: Topology,
        config: NodeTrackerConfig,
        snapshots: Option<SnapshotStore>,
    ) -> Self {
        let handler = NodeTrackerHandler::new(
            registry,
            topology,
            heartbeat_config(&config),
            config.gates.max_concurrent_node_unregistrations,
            config.gates.max_concurrent_incremental_heartbeats_per_shard,
        );
        Self { handler, config, snapshots }
    }

    /// The network-name priority list a caller should use when filling in
    /// [`RegisterRequest::network_priority`] (spec §4.1/§4.2).
    pub fn network_priority(&self) -> &[String] {
        &self.config.addresses.network_priority
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn SignalSubscriber + Send>) {
        self.handler.subscribe(subscriber);
    }

    /// Raises the cluster-wide provision lock (spec §4.4 step 1): every
    /// subsequent [`Self::register`] is rejected until
    /// [`Self::unlock_provisioning`] is called.
    pub fn lock_for_provisioning(&mut self) {
        self.handler.lock_for_provisioning();
    }

    pub fn unlock_provisioning(&mut self) {
        self.handler.unlock_provisioning();
    }

    pub fn provision_lock_held(&self) -> bool {
        self.handler.provision_lock_held()
    }

    pub fn registry(&self) -> &Registry {
        self.handler.registry()
    }

    pub fn topology(&self) -> &Topology {
        self.handler.topology()
    }

    /// Persists the current registry and topology as a new snapshot
    /// generation. Returns an error if this service was opened
    /// [`Self::in_memory`] — there is nowhere to write to.
    pub fn save(&self) -> Result<u64> {
        let store = self.snapshots.as_ref().expect("in-memory service has no snapshot directory");
        Ok(store.save(self.handler.registry(), self.handler.topology())?)
    }

    // ------------------------------------------------------------------
    // RPC surface (spec §4.4/§6), timestamped at the call boundary the
    // way a real leader stamps a command at submission time.
    // ------------------------------------------------------------------

    pub fn register(&mut self, request: RegisterRequest) -> Result<RegisterResponse> {
        Ok(self.handler.register(request, Timestamp::now())?)
    }

    pub fn full_heartbeat(&mut self, request: FullHeartbeatRequest) -> Result<FullHeartbeatResponse> {
        Ok(self.handler.full_heartbeat(request, Timestamp::now())?)
    }

    pub fn incremental_heartbeat(
        &mut self,
        request: IncrementalHeartbeatRequest,
    ) -> Result<IncrementalHeartbeatResponse> {
        Ok(self.handler.incremental_heartbeat(request, Timestamp::now())?)
    }

    pub fn unregister(&mut self, node_id: NodeId, schedule_removal: bool) -> Result<()> {
        Ok(self.handler.unregister(node_id, schedule_removal, Timestamp::now())?)
    }

    pub fn remove_node(&mut self, node_id: NodeId) -> Result<()> {
        Ok(self.handler.remove_node(node_id)?)
    }

    // ------------------------------------------------------------------
    // Attribute tree (spec §4.8/§6)
    // ------------------------------------------------------------------

    pub fn read_node_attributes(&self, node_id: NodeId) -> Result<NodeAttributeView> {
        Ok(self.handler.read_node_attributes(node_id)?)
    }

    pub fn write_node_attribute(&mut self, node_id: NodeId, write: NodeAttributeWrite) -> Result<()> {
        Ok(self.handler.write_node_attribute(node_id, write)?)
    }

    /// The synthetic cluster-wide "cluster node map" attribute (spec
    /// §4.8): per-state node-name buckets plus aggregated statistics.
    pub fn cluster_node_map(&self) -> ClusterNodeMap {
        self.handler.cluster_node_map()
    }

    // ------------------------------------------------------------------
    // Topology administration (C1, spec §4.1)
    // ------------------------------------------------------------------

    pub fn create_data_center(&mut self, name: impl Into<String>) -> Result<DataCenterId> {
        Ok(self.handler.create_data_center(name)?)
    }

    pub fn rename_data_center(&mut self, id: DataCenterId, new_name: impl Into<String>) -> Result<()> {
        Ok(self.handler.rename_data_center(id, new_name)?)
    }

    pub fn destroy_data_center(&mut self, id: DataCenterId) -> Result<()> {
        Ok(self.handler.destroy_data_center(id)?)
    }

    pub fn create_rack(&mut self, name: impl Into<String>, data_center: Option<DataCenterId>) -> Result<RackId> {
        Ok(self.handler.create_rack(name, data_center)?)
    }

    pub fn rename_rack(&mut self, id: RackId, new_name: impl Into<String>) -> Result<()> {
        Ok(self.handler.rename_rack(id, new_name)?)
    }

    pub fn set_rack_parent(&mut self, rack_id: RackId, data_center: Option<DataCenterId>) -> Result<()> {
        Ok(self.handler.set_rack_parent(rack_id, data_center)?)
    }

    pub fn destroy_rack(&mut self, id: RackId) -> Result<()> {
        Ok(self.handler.destroy_rack(id)?)
    }

    pub fn create_host(&mut self, name: impl Into<String>, rack: RackId) -> Result<HostId> {
        Ok(self.handler.create_host(name, rack)?)
    }

    pub fn rename_host(&mut self, id: HostId, new_name: impl Into<String>) -> Result<()> {
        Ok(self.handler.rename_host(id, new_name)?)
    }

    pub fn destroy_host(&mut self, id: HostId) -> Result<()> {
        Ok(self.handler.destroy_host(id)?)
    }

    pub fn bind_node_to_host(&mut self, node_id: NodeId, host_id: HostId) -> Result<()> {
        Ok(self.handler.bind_node_to_host(node_id, host_id)?)
    }
}

fn heartbeat_config(config: &NodeTrackerConfig) -> HeartbeatConfig {
    HeartbeatConfig {
        registered_node_timeout_ms: config.leases.registered_node_timeout_ms,
        online_node_timeout_ms: config.leases.online_node_timeout_ms,
        replication_priority_count: config.replication.replication_priority_count as usize,
        max_concurrent_node_registrations: config.gates.max_concurrent_node_registrations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    use nt_core::Statistics;
    use nt_types::{CellTag, FlavorSet, NodeHeartbeatKind};

    fn register_request(address: &str) -> RegisterRequest {
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

    #[test]
    fn in_memory_service_registers_and_heartbeats_a_node() {
        let mut service = NodeTrackerService::in_memory(NodeTrackerConfig::default());
        let response = service.register(register_request("10.0.0.1:1")).unwrap();

        service
            .full_heartbeat(FullHeartbeatRequest {
                node_id: response.node_id,
                kind: NodeHeartbeatKind::Data,
                statistics: Statistics::default(),
            })
            .unwrap();
        assert_eq!(service.registry().find(response.node_id).unwrap().local_state(), nt_types::NodeState::Online);
    }

    #[test]
    fn register_is_rejected_while_the_provision_lock_is_held() {
        let mut service = NodeTrackerService::in_memory(NodeTrackerConfig::default());
        service.lock_for_provisioning();
        assert!(service.register(register_request("10.0.0.1:1")).is_err());

        service.unlock_provisioning();
        assert!(service.register(register_request("10.0.0.1:1")).is_ok());
    }

    #[test]
    fn cluster_node_map_reflects_a_freshly_registered_node() {
        let mut service = NodeTrackerService::in_memory(NodeTrackerConfig::default());
        let response = service.register(register_request("10.0.0.1:1")).unwrap();
        let map = service.cluster_node_map();
        assert!(map.registered.iter().any(|name| name == "10.0.0.1:1"));
        let _ = response;
    }

    #[test]
    fn save_and_reopen_round_trips_a_registered_node() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = NodeTrackerService::open_with_config(dir.path(), NodeTrackerConfig::default()).unwrap();
        let response = service.register(register_request("10.0.0.1:1")).unwrap();
        service.save().unwrap();

        let reopened = NodeTrackerService::open_with_config(dir.path(), NodeTrackerConfig::default()).unwrap();
        assert!(reopened.registry().find(response.node_id).is_some());
    }

    #[test]
    fn network_priority_reflects_configuration() {
        let service = NodeTrackerService::in_memory(NodeTrackerConfig::default());
        assert_eq!(service.network_priority()[0], "interconnect");
    }
}
