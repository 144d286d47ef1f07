//! # nt-core: node, registry and heartbeat state machine
//!
//! This crate is the deterministic heart of the node tracker. It receives
//! committed commands and produces new state plus effects to execute.
//!
//! ## Key principles
//!
//! - **No IO**: the kernel never touches disk, network, or any external resource.
//! - **No clocks**: timestamps arrive on the command, assigned by the leader at commit time.
//! - **No randomness**: same input always produces the same output.
//! - **Pure functions**: `apply_committed(registry, command) -> (registry, effects)`.
//!
//! ## Architecture
//!
//! - [`node`]: the [`Node`](node::Node) object (C2)
//! - [`registry`]: the [`Registry`](registry::Registry) owning every node and its indices (C3)
//! - [`heartbeat`]: commands the heartbeat state machine accepts (C4)
//! - [`effects`]: effects the runtime must execute after a commit
//! - [`kernel`]: `apply_committed`, tying command processing together (C4)
//! - [`replication`]: replica-set and queue bookkeeping (C5)
//! - [`multicell`]: per-cell state aggregation (C6)
//! - [`visit_mark`]: the process-wide visit-mark allocator
//! - [`state_hash`]: deterministic state hashing for snapshot/replay verification

pub mod effects;
pub mod error;
pub mod heartbeat;
pub mod kernel;
pub mod multicell;
pub mod node;
pub mod registry;
pub mod replication;
pub mod snapshot;
pub mod state_hash;
pub mod visit_mark;


pub use effects::Effect;
pub use error::NodeTrackerError;
pub use heartbeat::{Command, HeartbeatConfig, Statistics};
pub use kernel::apply_committed;
pub use node::Node;
pub use registry::Registry;
pub use snapshot::NodeSnapshot;
