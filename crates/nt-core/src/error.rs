//! Error taxonomy for the node tracker.
//!
//! Variants are distinct so callers can `match` rather than parse strings.
//! Conditions the spec calls programming errors never appear here — they
//! `panic!`/`debug_assert!` at the call site instead, because a `Result`
//! variant would let a caller catch and ignore a consensus-breaking bug.

use nt_types::NodeId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeTrackerError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("address already in use: {0}")]
    AddressAlreadyExists(String),

    #[error("node is banned: {0}")]
    Banned(NodeId),

    #[error("invalid state transition for node {node_id}: {message}")]
    InvalidState { node_id: NodeId, message: String },

    #[error("node-id pool exhausted")]
    LimitReached,

    #[error("unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, NodeTrackerError>;
