//! Effects produced by the kernel (C4/C8 signals).
//!
//! The kernel is pure: it produces effects describing what subscribers
//! should be told, but never calls them itself. [`crate::kernel::apply_committed`]
//! returns these in commit order; the embedding facade fans them out to
//! whatever external surface is listening (chunk manager, attribute tree,
//! metrics).

use nt_types::{HostId, NodeId, NodeState};
use serde::{Deserialize, Serialize};

use crate::heartbeat::Statistics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// A node finished registering and was inserted into every index.
    NodeRegistered(NodeId),
    /// A node transitioned out of `registered`/`online` into `unregistered`.
    NodeUnregistered(NodeId),
    /// A node was erased from the registry after its removal mutation committed.
    NodeRemoved(NodeId),
    /// A full heartbeat committed; the chunk manager seeds replica sets from this.
    FullHeartbeat { node_id: NodeId, statistics: Statistics },
    /// An incremental heartbeat committed.
    IncrementalHeartbeat { node_id: NodeId, alerts: Vec<String> },
    /// A node's cluster-wide aggregated state changed.
    AggregatedStateChanged { node_id: NodeId, new_state: NodeState },
    /// Hosts whose effective ancestor tags changed and must be told to
    /// refresh their local configuration view.
    ConfigurationRefresh { hosts: Vec<HostId> },
    /// A node's tags were rebuilt as a side effect of a topology or
    /// maintenance change (scenario 5: rack rebind and tag propagation).
    NodeConfigUpdated(NodeId),
    /// The lease transaction's timeout must be (re)armed at this value.
    LeaseTimeoutSet { node_id: NodeId, timeout_ms: u64 },
    /// Best-effort, post-commit only: write the node's last-seen time to
    /// the attribute tree. Failure is swallowed to an `error` log, never
    /// fails the mutation (§7).
    AttributeTreeTouch { node_id: NodeId },
}
