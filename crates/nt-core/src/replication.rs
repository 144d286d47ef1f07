//! Replica and chunk-queue bookkeeping owned by each node (C5).
//!
//! Mutated only by [`crate::kernel`] handlers, never by an external caller —
//! every operation here asserts the invariants from the node-lifecycle
//! contract rather than returning a recoverable error, since violating one
//! means a bug upstream already broke replication determinism.
//!
//! Scope note: full CRP in-flight target tracking and journal-chunk
//! three-way state collapsing are reduced here to the single-state model
//! (a replica is either approved, unapproved, or absent) and a flat
//! chunk-id → target map, which is enough to drive the queues' ordering and
//! eviction invariants without modeling every journal replica state.

use std::collections::{BTreeMap, BTreeSet};

use nt_types::{ChunkId, MediumIndex, NodeId, ReplicaIndex, Timestamp};
use serde::{Deserialize, Serialize};

/// A single replica, identified by chunk, ordinal and medium.
pub type ReplicaKey = (ChunkId, ReplicaIndex, MediumIndex);

/// A dense bitmask over medium indices, mirroring the rack-index allocator's
/// bitmask pattern: cheap membership tests and cheap "is this the last
/// medium" checks when removing an entry from a priority queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediumMask(u64);

impl MediumMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, medium: MediumIndex) {
        self.0 |= 1u64 << medium.get();
    }

    pub fn remove(&mut self, medium: MediumIndex) {
        self.0 &= !(1u64 << medium.get());
    }

    pub fn contains(self, medium: MediumIndex) -> bool {
        self.0 & (1u64 << medium.get()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = MediumIndex> {
        (0..64u8).filter(move |b| self.0 & (1u64 << b) != 0).map(MediumIndex::new)
    }
}

/// Per-node replica and chunk-queue state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicaBookkeeping {
    approved: BTreeSet<ReplicaKey>,
    unapproved: BTreeMap<ReplicaKey, Timestamp>,
    destroyed: BTreeSet<ReplicaKey>,
    destroyed_cursor: Option<ReplicaKey>,
    removal_queue: BTreeSet<ReplicaKey>,
    /// Indexed by priority (`0..replication_priority_count`).
    push_replication: Vec<BTreeMap<ReplicaKey, MediumMask>>,
    push_replication_target_node_ids: BTreeMap<ChunkId, BTreeMap<MediumIndex, NodeId>>,
    /// Indexed by priority, keyed by chunk id (not a chunk pointer) so
    /// entries survive chunk destruction for eviction, per §4.5.
    pull_replication: Vec<BTreeMap<ChunkId, MediumMask>>,
    chunks_being_pulled: BTreeMap<ChunkId, MediumMask>,
    seal_queue: BTreeSet<ReplicaKey>,
    endorsements: BTreeSet<ReplicaKey>,
}

impl ReplicaBookkeeping {
    pub fn new(priority_count: usize) -> Self {
        Self {
            push_replication: vec![BTreeMap::new(); priority_count],
            pull_replication: vec![BTreeMap::new(); priority_count],
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Approved / unapproved replica sets
    // ------------------------------------------------------------------

    /// A replica is in the approved set or the unapproved map, never both.
    pub fn add_approved_replica(&mut self, key: ReplicaKey) {
        self.unapproved.remove(&key);
        self.approved.insert(key);
    }

    pub fn add_unapproved_replica(&mut self, key: ReplicaKey, reported_at: Timestamp) {
        debug_assert!(
            !self.approved.contains(&key),
            "replica already approved: {:?}",
            key
        );
        self.unapproved.insert(key, reported_at);
    }

    pub fn remove_replica(&mut self, key: ReplicaKey) {
        self.approved.remove(&key);
        self.unapproved.remove(&key);
    }

    pub fn is_approved(&self, key: ReplicaKey) -> bool {
        self.approved.contains(&key)
    }

    pub fn is_unapproved(&self, key: ReplicaKey) -> bool {
        self.unapproved.contains_key(&key)
    }

    pub fn approved_count(&self) -> usize {
        self.approved.len()
    }

    /// Approved-replica count grouped by medium. Used by snapshotting
    /// (nt-persistence) to persist replica *sizes* without the replica
    /// sets themselves — see [`crate::snapshot`].
    pub fn approved_counts_by_medium(&self) -> BTreeMap<MediumIndex, u32> {
        let mut counts = BTreeMap::new();
        for (_, _, medium) in &self.approved {
            *counts.entry(*medium).or_insert(0u32) += 1;
        }
        counts
    }

    /// Number of priority buckets the push/pull replication queues were
    /// constructed with.
    pub fn priority_count(&self) -> usize {
        self.push_replication.len()
    }

    // ------------------------------------------------------------------
    // Destroyed replicas
    // ------------------------------------------------------------------

    /// Adds a destroyed replica. If already present, returns `false` and
    /// removes it from the removal queue instead — this asymmetry is
    /// intentional (§9) and preserved as-is.
    pub fn add_destroyed_replica(&mut self, key: ReplicaKey) -> bool {
        if !self.destroyed.insert(key) {
            self.removal_queue.remove(&key);
            return false;
        }
        true
    }

    /// Number of replicas marked destroyed but not yet purged — surfaced
    /// read-only on the attribute tree as `destroyed-chunk-replica-count`
    /// (spec §6).
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.len()
    }

    pub fn remove_destroyed_replica(&mut self, key: ReplicaKey) {
        self.destroyed.remove(&key);
        if self.destroyed_cursor == Some(key) {
            self.advance_destroyed_cursor();
        }
    }

    /// Advances the round-robin cursor to the next live destroyed replica,
    /// or to `None` ("end") if the set is empty.
    pub fn advance_destroyed_cursor(&mut self) {
        self.destroyed_cursor = self
            .destroyed_cursor
            .and_then(|cur| self.destroyed.range(cur..).nth(1).copied())
            .or_else(|| self.destroyed.iter().next().copied());
    }

    pub fn destroyed_cursor(&self) -> Option<ReplicaKey> {
        self.destroyed_cursor
    }

    // ------------------------------------------------------------------
    // Chunk removal queue
    // ------------------------------------------------------------------

    /// Adding a replica whose chunk is known-destroyed must not enqueue it
    /// for removal (the chunk manager already knows to discard it).
    pub fn enqueue_removal(&mut self, key: ReplicaKey) {
        let chunk_known_destroyed = self.destroyed.iter().any(|(c, _, _)| *c == key.0);
        if !chunk_known_destroyed {
            self.removal_queue.insert(key);
        }
    }

    pub fn dequeue_removal(&mut self, key: ReplicaKey) {
        self.removal_queue.remove(&key);
    }

    pub fn removal_queue_len(&self) -> usize {
        self.removal_queue.len()
    }

    // ------------------------------------------------------------------
    // Push replication
    // ------------------------------------------------------------------

    pub fn add_push_replication(&mut self, priority: usize, key: ReplicaKey, medium: MediumIndex) {
        debug_assert!(
            priority < self.push_replication.len(),
            "push replication priority {priority} out of range for {} buckets",
            self.push_replication.len()
        );
        self.push_replication[priority].entry(key).or_default().insert(medium);
    }

    /// Removes a single medium from an entry, or the whole entry if
    /// `medium` is `None` ("all-media-index" removal).
    pub fn remove_push_replication(&mut self, priority: usize, key: ReplicaKey, medium: Option<MediumIndex>) {
        debug_assert!(
            priority < self.push_replication.len(),
            "push replication priority {priority} out of range for {} buckets",
            self.push_replication.len()
        );
        match medium {
            Some(m) => {
                if let Some(mask) = self.push_replication[priority].get_mut(&key) {
                    mask.remove(m);
                    if mask.is_empty() {
                        self.push_replication[priority].remove(&key);
                    }
                }
            }
            None => {
                self.push_replication[priority].remove(&key);
            }
        }
    }

    pub fn set_push_replication_target(&mut self, chunk: ChunkId, medium: MediumIndex, target: NodeId) {
        self.push_replication_target_node_ids
            .entry(chunk)
            .or_default()
            .insert(medium, target);
    }

    pub fn push_replication_target(&self, chunk: ChunkId, medium: MediumIndex) -> Option<NodeId> {
        self.push_replication_target_node_ids
            .get(&chunk)
            .and_then(|m| m.get(&medium))
            .copied()
    }

    pub fn clear_push_replication_targets(&mut self, chunk: ChunkId) {
        self.push_replication_target_node_ids.remove(&chunk);
    }

    // ------------------------------------------------------------------
    // Pull replication (CRP)
    // ------------------------------------------------------------------

    pub fn add_pull_replication(&mut self, priority: usize, chunk: ChunkId, medium: MediumIndex) {
        debug_assert!(
            priority < self.pull_replication.len(),
            "pull replication priority {priority} out of range for {} buckets",
            self.pull_replication.len()
        );
        self.pull_replication[priority].entry(chunk).or_default().insert(medium);
    }

    pub fn remove_pull_replication(&mut self, priority: usize, chunk: ChunkId, medium: Option<MediumIndex>) {
        debug_assert!(
            priority < self.pull_replication.len(),
            "pull replication priority {priority} out of range for {} buckets",
            self.pull_replication.len()
        );
        match medium {
            Some(m) => {
                if let Some(mask) = self.pull_replication[priority].get_mut(&chunk) {
                    mask.remove(m);
                    if mask.is_empty() {
                        self.pull_replication[priority].remove(&chunk);
                    }
                }
            }
            None => {
                self.pull_replication[priority].remove(&chunk);
            }
        }
    }

    pub fn mark_chunk_being_pulled(&mut self, chunk: ChunkId, medium: MediumIndex) {
        self.chunks_being_pulled.entry(chunk).or_default().insert(medium);
    }

    pub fn unmark_chunk_being_pulled(&mut self, chunk: ChunkId, medium: MediumIndex) {
        if let Some(mask) = self.chunks_being_pulled.get_mut(&chunk) {
            mask.remove(medium);
            if mask.is_empty() {
                self.chunks_being_pulled.remove(&chunk);
            }
        }
    }

    pub fn is_chunk_being_pulled(&self, chunk: ChunkId, medium: MediumIndex) -> bool {
        self.chunks_being_pulled
            .get(&chunk)
            .is_some_and(|mask| mask.contains(medium))
    }

    // ------------------------------------------------------------------
    // Seal queue and endorsements
    // ------------------------------------------------------------------

    pub fn enqueue_seal(&mut self, key: ReplicaKey) {
        self.seal_queue.insert(key);
    }

    pub fn dequeue_seal(&mut self, key: ReplicaKey) {
        self.seal_queue.remove(&key);
    }

    pub fn add_endorsement(&mut self, key: ReplicaKey) {
        self.endorsements.insert(key);
    }

    pub fn confirm_endorsement(&mut self, key: ReplicaKey) {
        self.endorsements.remove(&key);
    }

    /// Shrinks every owned collection and resets iterators into them, per
    /// §4.2's `compact()` contract.
    pub fn compact(&mut self) {
        self.destroyed_cursor = self.destroyed.iter().next().copied();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(chunk: u64) -> ReplicaKey {
        (ChunkId::new(chunk), ReplicaIndex::new(0), MediumIndex::new(0))
    }

    #[test]
    fn replica_is_never_both_approved_and_unapproved() {
        let mut b = ReplicaBookkeeping::new(4);
        b.add_unapproved_replica(key(1), Timestamp::from_micros(10));
        assert!(b.is_unapproved(key(1)));
        b.add_approved_replica(key(1));
        assert!(b.is_approved(key(1)));
        assert!(!b.is_unapproved(key(1)));
    }

    #[test]
    fn adding_a_destroyed_replica_twice_returns_false_and_clears_removal_queue() {
        let mut b = ReplicaBookkeeping::new(4);
        b.enqueue_removal(key(1));
        assert!(b.add_destroyed_replica(key(1)));
        assert!(!b.add_destroyed_replica(key(1)));
        assert_eq!(b.removal_queue_len(), 0);
    }

    #[test]
    fn enqueue_removal_skips_known_destroyed_chunks() {
        let mut b = ReplicaBookkeeping::new(4);
        b.add_destroyed_replica(key(1));
        b.enqueue_removal(key(1));
        assert_eq!(b.removal_queue_len(), 0);
    }

    #[test]
    fn destroyed_cursor_always_points_into_the_set_or_is_none() {
        let mut b = ReplicaBookkeeping::new(4);
        assert_eq!(b.destroyed_cursor(), None);
        b.add_destroyed_replica(key(1));
        b.advance_destroyed_cursor();
        assert_eq!(b.destroyed_cursor(), Some(key(1)));
        b.remove_destroyed_replica(key(1));
        assert_eq!(b.destroyed_cursor(), None);
    }

    #[test]
    fn push_and_pull_replication_round_trip() {
        let mut source = ReplicaBookkeeping::new(4);
        let mut target = ReplicaBookkeeping::new(4);
        let chunk = ChunkId::new(5);
        let medium = MediumIndex::new(2);
        let replica_key = (chunk, ReplicaIndex::new(0), medium);

        source.add_push_replication(0, replica_key, medium);
        source.set_push_replication_target(chunk, medium, NodeId::from(9));
        target.add_pull_replication(0, chunk, medium);
        target.mark_chunk_being_pulled(chunk, medium);

        assert_eq!(source.push_replication_target(chunk, medium), Some(NodeId::from(9)));
        assert!(target.is_chunk_being_pulled(chunk, medium));

        source.remove_push_replication(0, replica_key, None);
        source.clear_push_replication_targets(chunk);
        target.remove_pull_replication(0, chunk, None);
        target.unmark_chunk_being_pulled(chunk, medium);

        assert_eq!(source.push_replication_target(chunk, medium), None);
        assert!(!target.is_chunk_being_pulled(chunk, medium));
    }
}
