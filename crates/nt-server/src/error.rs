//! RPC-facing error taxonomy (C8).
//!
//! Maps the core's [`nt_core::NodeTrackerError`] and
//! [`nt_topology::TopologyError`] onto the error codes named in spec §6:
//! `no-such-node`, `no-such-rack`, `invalid-state`, `banned`,
//! `unavailable`. A fifth code, `provision-lock-held`, guards the
//! startup-safety check ahead of `Register`'s other preconditions.

use nt_core::NodeTrackerError;
use nt_topology::TopologyError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, RpcError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("no such node: {0}")]
    NoSuchNode(nt_types::NodeId),

    #[error("no such rack: {0}")]
    NoSuchRack(nt_types::RackId),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("banned: node {0} rejected registration")]
    Banned(nt_types::NodeId),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("provision lock held; registration is not accepted during startup")]
    ProvisionLockHeld,
}

impl RpcError {
    /// True for the two error codes spec §8's retry policy calls
    /// "transient-looking" and retriable with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Banned(_) | Self::Unavailable(_) | Self::ProvisionLockHeld)
    }
}

impl From<NodeTrackerError> for RpcError {
    fn from(err: NodeTrackerError) -> Self {
        match err {
            NodeTrackerError::NodeNotFound(id) => Self::NoSuchNode(id),
            NodeTrackerError::Banned(id) => Self::Banned(id),
            NodeTrackerError::Unavailable(reason) => Self::Unavailable(reason),
            NodeTrackerError::InvalidState { message, .. } => Self::InvalidState(message),
            NodeTrackerError::AddressAlreadyExists(addr) => {
                Self::InvalidState(format!("address already in use: {addr}"))
            }
            NodeTrackerError::LimitReached => {
                Self::Unavailable("node-id pool exhausted".to_string())
            }
        }
    }
}

impl From<TopologyError> for RpcError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::RackNotFound(id) => Self::NoSuchRack(id),
            other => Self::InvalidState(other.to_string()),
        }
    }
}
