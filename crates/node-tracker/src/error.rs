//! Facade-level error type (spec §10.2): wraps the RPC surface's
//! [`nt_server::RpcError`] and the persistence layer's
//! [`nt_persistence::PersistenceError`] behind one `Result` alias so an
//! embedder only needs to match on a single enum.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeTrackerError>;

#[derive(Debug, Error)]
pub enum NodeTrackerError {
    #[error(transparent)]
    Rpc(#[from] nt_server::RpcError),

    #[error(transparent)]
    Persistence(#[from] nt_persistence::PersistenceError),

    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),
}
