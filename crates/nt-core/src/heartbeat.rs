//! Commands accepted by the heartbeat state machine (C4).
//!
//! Three RPC-driven commands (`Register`, `FullHeartbeat`,
//! `IncrementalHeartbeat`) plus two internally-submitted mutations
//! (`Unregister`, `RemoveNode`) make up the state machine. Every command
//! carries the timestamp assigned by the leader at commit time — the
//! kernel itself never reads the wall clock.

use std::collections::{BTreeMap, BTreeSet};

use nt_types::{CellTag, FlavorSet, LeaseTransactionId, NodeHeartbeatKind, NodeId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// RPC: Register. Constructs a new node, or kicks out a stale one
    /// registered under the same default address.
    Register {
        default_address: String,
        addresses: BTreeMap<String, String>,
        flavors: FlavorSet,
        user_tags: BTreeSet<String>,
        /// Tags the node reports about itself at registration (spec §3's
        /// "node tags"), distinct from operator-set `user_tags`.
        node_tags: BTreeSet<String>,
        statistics: Statistics,
        local_cell: CellTag,
        secondary_cells: Vec<CellTag>,
        lease_transaction: LeaseTransactionId,
        timestamp: Timestamp,
    },
    /// RPC: FullHeartbeat. Only valid in state `registered`. `kind`
    /// identifies which of the node's required heartbeat kinds (spec §3)
    /// this report satisfies.
    FullHeartbeat {
        node_id: NodeId,
        kind: NodeHeartbeatKind,
        statistics: Statistics,
        timestamp: Timestamp,
    },
    /// RPC: IncrementalHeartbeat. Only valid in state `online`.
    IncrementalHeartbeat {
        node_id: NodeId,
        statistics_delta: Statistics,
        alerts: Vec<String>,
        timestamp: Timestamp,
    },
    /// Internal mutation: fired by a lease-expiry callback or by an
    /// operator-initiated unregister.
    Unregister {
        node_id: NodeId,
        schedule_removal: bool,
        timestamp: Timestamp,
    },
    /// Internal mutation: only valid from `unregistered`. Drained from the
    /// removal queue once the removal semaphore admits it.
    RemoveNode { node_id: NodeId },
}

/// Node statistics as reported on registration and on every heartbeat.
/// The node tracker treats the contents as opaque counters to merge and
/// expose, never as something it makes scheduling decisions from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Resource usage, keyed by resource tag (cpu, memory, slots, ...).
    pub resource_usage: BTreeMap<String, u64>,
    /// Per-medium total space, keyed by medium name.
    pub total_space: BTreeMap<String, u64>,
    pub session_count: u32,
}

impl Statistics {
    /// Merges a delta statistics report into `self`, as an incremental
    /// heartbeat does: later values replace earlier ones per key.
    pub fn merge(&mut self, delta: &Statistics) {
        for (k, v) in &delta.resource_usage {
            self.resource_usage.insert(k.clone(), *v);
        }
        for (k, v) in &delta.total_space {
            self.total_space.insert(k.clone(), *v);
        }
        if delta.session_count != 0 {
            self.session_count = delta.session_count;
        }
    }
}

/// Configuration knobs the kernel consults while applying heartbeat
/// commands (mirrors `nt_config::NodeTrackerConfig`, passed in rather than
/// depended on directly, since the kernel must stay pure).
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub registered_node_timeout_ms: u64,
    pub online_node_timeout_ms: u64,
    /// Number of priority buckets in a newly constructed node's push/pull
    /// replication queues (mirrors `nt_config::ReplicationConfig`). Sized
    /// at construction time, not after the fact, so a configured value
    /// other than the default can never leave a node with mismatched
    /// queue counts.
    pub replication_priority_count: usize,
    /// Maximum number of nodes that may be mid-`Register` at once. The
    /// kernel itself does not track in-flight counts (it is pure and has
    /// no notion of "in flight"); the caller driving `apply_committed`
    /// reports the current count here so the kernel can reject with
    /// `Unavailable` before admitting one more.
    pub max_concurrent_node_registrations: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            registered_node_timeout_ms: 60_000,
            online_node_timeout_ms: 30_000,
            replication_priority_count: 4,
            max_concurrent_node_registrations: 256,
        }
    }
}
