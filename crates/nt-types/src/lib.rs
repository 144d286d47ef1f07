//! # nt-types: Core types for the node tracker
//!
//! Shared vocabulary used across the node tracker crates:
//! - Entity ids ([`NodeId`], [`RackId`], [`DataCenterId`], [`HostId`], [`CellTag`])
//! - Storage addressing ([`MediumIndex`], [`ChunkId`], [`ReplicaIndex`])
//! - Consensus handles ([`LeaseTransactionId`])
//! - Temporal types ([`Timestamp`])
//! - Lifecycle vocabulary ([`NodeState`], [`NodeFlavor`], [`FlavorSet`], [`NodeHeartbeatKind`])
//! - Maintenance requests ([`MaintenanceKind`])

use std::fmt::{self, Display};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity ids
// ============================================================================

/// Sentinel returned by [`NodeId::INVALID`] and never assigned to a live node.
const INVALID_NODE_ID: u32 = u32::MAX;

/// Upper bound (inclusive) of the node-id allocation range.
///
/// The allocator wraps back to zero once it would exceed this value, per
/// the registry's bounded monotonic generator.
pub const MAX_NODE_ID: u32 = (1 << 24) - 1;

/// Unique identifier for a cluster node.
///
/// Monotonically allocated by the registry, wrapping within `[0, MAX_NODE_ID]`
/// and never reusing a currently-live id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Sentinel id meaning "no node" / "not yet assigned".
    pub const INVALID: NodeId = NodeId(INVALID_NODE_ID);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn is_valid(self) -> bool {
        self.0 != INVALID_NODE_ID
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Unique identifier for a data center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataCenterId(u16);

impl DataCenterId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl Display for DataCenterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dc{}", self.0)
    }
}

/// Unique identifier for a rack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RackId(u32);

impl RackId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Display for RackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rack{}", self.0)
    }
}

/// Dense index of a live rack, usable as a bit position in a 64-bit filter mask.
///
/// Valid range is `[1, 63]`; `0` is reserved to mean "no rack" and is never
/// allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RackIndex(u8);

impl RackIndex {
    /// Reserved value meaning "node has no rack".
    pub const NONE: RackIndex = RackIndex(0);

    /// Highest assignable index; at most this many racks can be live at once.
    pub const MAX: u8 = 63;

    /// Wraps a raw index already known to be in range. The topology
    /// allocator is the only caller; it never hands out an out-of-range
    /// value.
    pub fn from_raw(raw: u8) -> Self {
        debug_assert!(raw <= Self::MAX, "rack index out of range: {raw}");
        Self(raw)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Default for RackIndex {
    fn default() -> Self {
        Self::NONE
    }
}

/// Dense index of a live data center, usable as a bit position in a
/// filter mask.
///
/// Valid range is `[1, 16]`; `0` is reserved to mean "no data center" and
/// is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataCenterIndex(u8);

impl DataCenterIndex {
    /// Reserved value meaning "no data center".
    pub const NONE: DataCenterIndex = DataCenterIndex(0);

    /// Highest assignable index; at most this many data centers can be
    /// live at once.
    pub const MAX: u8 = 16;

    /// Wraps a raw index already known to be in range. The topology
    /// allocator is the only caller; it never hands out an out-of-range
    /// value.
    pub fn from_raw(raw: u8) -> Self {
        debug_assert!(raw <= Self::MAX, "data center index out of range: {raw}");
        Self(raw)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl Default for DataCenterIndex {
    fn default() -> Self {
        Self::NONE
    }
}

/// Unique identifier for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId(u32);

impl HostId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host{}", self.0)
    }
}

/// Identifies a master cell in a multi-cell deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellTag(u16);

impl CellTag {
    pub fn new(tag: u16) -> Self {
        Self(tag)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl Display for CellTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell{}", self.0)
    }
}

/// Dense index of a named storage medium (e.g. SSD, HDD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediumIndex(u8);

impl MediumIndex {
    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Display for MediumIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Identifies a replica's ordinal within a chunk's replica list
/// (erasure-coded chunks have more than one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaIndex(u8);

impl ReplicaIndex {
    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

/// Stable identifier of a chunk, owned by the (out of scope) chunk manager.
///
/// The node tracker treats this as opaque: it never inspects a chunk's
/// contents, only files replicas of it into per-node queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkId(u64);

impl ChunkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk-{:016x}", self.0)
    }
}

/// Opaque handle to a lease transaction owned by the (out of scope)
/// consensus/transaction manager. Presence on a node means the node is
/// considered live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeaseTransactionId(u64);

impl LeaseTransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// Microseconds since the Unix epoch, as assigned by the leader at commit
/// time. The node tracker never reads the wall clock itself outside of
/// test fixtures and the facade's mutation submission path — committed
/// mutations carry their timestamp so replay is deterministic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Wall-clock timestamp. Used only outside the deterministic mutation
    /// pipeline (e.g. by a caller assembling a request before submission).
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;
        Self(micros)
    }

    pub fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis.saturating_mul(1000)))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

// ============================================================================
// Lifecycle vocabulary
// ============================================================================

/// A node's lifecycle state, either as seen by a single cell or as the
/// cluster-wide aggregate.
///
/// `Mixed` is only ever observed as the *aggregated* state: a single
/// cell's local view of a node is never `Mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Offline,
    Registered,
    Online,
    Unregistered,
    Mixed,
    Unknown,
}

impl Default for NodeState {
    fn default() -> Self {
        Self::Offline
    }
}

impl Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offline => "offline",
            Self::Registered => "registered",
            Self::Online => "online",
            Self::Unregistered => "unregistered",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A role a node plays. Determines which heartbeat kinds are required
/// before the node is considered online.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFlavor {
    Data,
    Exec,
    Tablet,
    Chaos,
}

impl NodeFlavor {
    pub const ALL: [NodeFlavor; 4] = [
        NodeFlavor::Data,
        NodeFlavor::Exec,
        NodeFlavor::Tablet,
        NodeFlavor::Chaos,
    ];

    fn bit(self) -> u8 {
        match self {
            NodeFlavor::Data => 0b0001,
            NodeFlavor::Exec => 0b0010,
            NodeFlavor::Tablet => 0b0100,
            NodeFlavor::Chaos => 0b1000,
        }
    }

    /// The heartbeat kind this flavor requires before the node counts as
    /// online. Tablet flavor reports through the cellar heartbeat rather
    /// than a dedicated one.
    pub fn required_heartbeat(self) -> NodeHeartbeatKind {
        match self {
            NodeFlavor::Data => NodeHeartbeatKind::Data,
            NodeFlavor::Exec => NodeHeartbeatKind::Exec,
            NodeFlavor::Tablet => NodeHeartbeatKind::Cellar,
            NodeFlavor::Chaos => NodeHeartbeatKind::Chaos,
        }
    }
}

/// A bitset of [`NodeFlavor`] values, dense enough to be `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct FlavorSet(u8);

impl FlavorSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, flavor: NodeFlavor) {
        self.0 |= flavor.bit();
    }

    pub fn contains(self, flavor: NodeFlavor) -> bool {
        self.0 & flavor.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = NodeFlavor> {
        NodeFlavor::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn required_heartbeats(self) -> impl Iterator<Item = NodeHeartbeatKind> {
        self.iter().map(NodeFlavor::required_heartbeat)
    }
}

impl FromIterator<NodeFlavor> for FlavorSet {
    fn from_iter<T: IntoIterator<Item = NodeFlavor>>(iter: T) -> Self {
        let mut set = Self::empty();
        for flavor in iter {
            set.insert(flavor);
        }
        set
    }
}

/// A kind of heartbeat a node may report. A node becomes `Online` only
/// after reporting every kind implied by its flavors. Ordered so a node's
/// received-kinds set can live in a `BTreeSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeHeartbeatKind {
    Data,
    Exec,
    Cellar,
    Chaos,
}

/// Kind of an operator-initiated maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaintenanceKind {
    Ban,
    Decommission,
    DisableSchedulerJobs,
    DisableWriteSessions,
    DisableTabletCells,
}

/// Unique identifier for a maintenance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaintenanceRequestId(u64);

impl MaintenanceRequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display_and_conversions() {
        let id = NodeId::from(7);
        assert_eq!(id.to_string(), "n7");
        assert_eq!(u32::from(id), 7);
        assert!(id.is_valid());
        assert!(!NodeId::INVALID.is_valid());
    }

    #[test]
    fn rack_index_none_is_zero() {
        assert!(RackIndex::NONE.is_none());
        assert_eq!(RackIndex::default(), RackIndex::NONE);
    }

    #[test]
    fn flavor_set_round_trips() {
        let mut set = FlavorSet::empty();
        set.insert(NodeFlavor::Data);
        set.insert(NodeFlavor::Chaos);

        assert!(set.contains(NodeFlavor::Data));
        assert!(!set.contains(NodeFlavor::Exec));
        assert!(set.contains(NodeFlavor::Chaos));

        let collected: Vec<_> = set.iter().collect();
        assert_eq!(collected, vec![NodeFlavor::Data, NodeFlavor::Chaos]);
    }

    #[test]
    fn flavor_required_heartbeats() {
        assert_eq!(NodeFlavor::Data.required_heartbeat(), NodeHeartbeatKind::Data);
        assert_eq!(
            NodeFlavor::Tablet.required_heartbeat(),
            NodeHeartbeatKind::Cellar
        );
    }

    #[test]
    fn timestamp_ordering_is_monotonic_under_add() {
        let t0 = Timestamp::from_micros(1000);
        let t1 = t0.saturating_add_millis(5);
        assert!(t1 > t0);
    }

    #[test]
    fn serde_round_trip_for_node_state() {
        let json = serde_json::to_string(&NodeState::Online).unwrap();
        let back: NodeState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeState::Online);
    }
}
