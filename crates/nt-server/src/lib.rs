//! # nt-server: external surface (C8)
//!
//! Everything the node tracker's RPC transport and attribute-tree layer
//! depend on, with no transport code of its own (spec §1 Non-goals: "RPC
//! transport...out of scope"). [`rpc::NodeTrackerHandler`] is the seam a
//! real RPC service binds request/response bytes to; it owns the pure
//! core's [`nt_core::Registry`]/[`nt_topology::Topology`] plus the
//! concurrency gates and signal bus the core itself cannot own.
//!
//! - [`gates`]: registration/removal/incremental-heartbeat concurrency
//!   gates (spec §4.4, §5 "Backpressure")
//! - [`signals`]: fan-out of committed [`nt_core::Effect`]s to subscribers
//!   (spec §4.8, §5 "Ordering guarantees")
//! - [`attributes`]: the attribute-tree read/write projection (spec §4.8,
//!   §6)
//! - [`rpc`]: request/response types and [`rpc::NodeTrackerHandler`],
//!   tying gates, signals and the pure kernel together
//! - [`error`]: the RPC-facing error taxonomy (spec §6, §7)

pub mod attributes;
pub mod error;
pub mod gates;
pub mod rpc;
pub mod signals;

pub use attributes::{ClusterNodeMap, NodeAttributeView, NodeAttributeWrite};
pub use error::{RpcError, ServerResult};
pub use gates::{GatePermit, RegistrationGate, RemovalGate, ShardedHeartbeatGate};
pub use rpc::{
    FullHeartbeatRequest, FullHeartbeatResponse, IncrementalHeartbeatRequest,
    IncrementalHeartbeatResponse, NodeTrackerHandler, RegisterRequest, RegisterResponse,
};
pub use signals::{Signal, SignalBus, SignalSubscriber};
