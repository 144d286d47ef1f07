//! # node-tracker
//!
//! The node tracker: the master cell subsystem that tracks every cluster
//! node's liveness, resources and topology placement, and serves as the
//! write path for cluster topology edits. This crate wires the other six
//! (`nt-types`, `nt-config`, `nt-topology`, `nt-core`, `nt-persistence`,
//! `nt-server`) together behind one [`NodeTrackerService`] entry point; it
//! carries no RPC transport or binary of its own (spec §1 Non-goals).
//!
//! [`NodeTrackerService::open`] recovers the last persisted snapshot (or
//! starts empty), then every mutation flows through
//! [`nt_core::apply_committed`] by way of [`nt_server::NodeTrackerHandler`],
//! publishing effects as [`nt_server::Signal`]s a caller can subscribe to.
//!
//! # Quick start
//!
//! ```no_run
//! use node_tracker::{NodeTrackerService, RegisterRequest, FlavorSet, CellTag, Statistics};
//! use std::collections::{BTreeMap, BTreeSet};
//!
//! let mut service = NodeTrackerService::open("./data")?;
//! let mut addresses = BTreeMap::new();
//! addresses.insert("default".to_string(), "10.0.0.1:9012".to_string());
//! let response = service.register(RegisterRequest {
//!     addresses,
//!     flavors: FlavorSet::empty(),
//!     user_tags: BTreeSet::new(),
//!     node_tags: BTreeSet::new(),
//!     statistics: Statistics::default(),
//!     local_cell: CellTag::new(0),
//!     secondary_cells: Vec::new(),
//!     network_priority: service.network_priority().to_vec(),
//! })?;
//! service.save()?;
//! # Ok::<(), node_tracker::NodeTrackerError>(())
//! ```

mod error;
mod service;

pub use error::{NodeTrackerError, Result};
pub use service::NodeTrackerService;

// Re-exported so an embedder only needs this one crate on its dependency
// line to build requests, inspect responses and subscribe to signals.
pub use nt_config::NodeTrackerConfig;
pub use nt_core::{Effect, HeartbeatConfig, Registry, Statistics};
pub use nt_server::{
    ClusterNodeMap, FullHeartbeatRequest, FullHeartbeatResponse, IncrementalHeartbeatRequest,
    IncrementalHeartbeatResponse, NodeAttributeView, NodeAttributeWrite, RegisterRequest,
    RegisterResponse, Signal, SignalSubscriber,
};
pub use nt_topology::Topology;
pub use nt_types::{
    CellTag, DataCenterId, FlavorSet, HostId, NodeHeartbeatKind, NodeId, NodeState, RackId, Timestamp,
};
