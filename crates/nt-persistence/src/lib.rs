//! # nt-persistence: versioned snapshot persistence (C7)
//!
//! The node tracker's committed state is a point-in-time snapshot, not an
//! append-only log: [`codec`] serializes a [`nt_core::Registry`] and
//! [`nt_topology::Topology`] pair in two passes — every node id first, then
//! every node's fields in the same order — so two replicas that commit the
//! same log produce byte-identical snapshot files. [`record`] frames the
//! encoded bytes with sentinels and a checksum so a reader can tell a torn
//! write from genuine corruption. [`storage`] manages a small generation
//! directory on disk: each save gets its own numbered file, and load always
//! prefers the newest generation that still frames and checksums cleanly.
//!
//! Replica sets are intentionally *not* part of the snapshot — only an
//! approved-replica count per medium survives the round trip. The chunk
//! manager owns the authoritative chunk-to-node mapping and reinserts the
//! real replica sets from it after load; see [`nt_core::snapshot`].

pub mod codec;
pub mod record;
pub mod storage;

pub use codec::{decode_snapshot, encode_snapshot, FORMAT_VERSION};
pub use storage::SnapshotStore;

/// Errors raised while framing, encoding or storing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode snapshot: {0}")]
    Encode(postcard::Error),
    #[error("failed to decode snapshot: {0}")]
    Decode(postcard::Error),
    #[error("snapshot format version {found} is newer than the highest supported version {max}")]
    UnsupportedVersion { found: u32, max: u32 },
    #[error("checksum mismatch: snapshot is corrupted")]
    ChecksumMismatch,
    #[error("unexpected end of snapshot data")]
    UnexpectedEof,
    #[error("torn write: {reason}")]
    TornWrite { reason: String },
    #[error("no snapshot generation found in {0}")]
    NoSnapshot(std::path::PathBuf),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
