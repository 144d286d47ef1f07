//! Concurrency gates (spec §4.4, §5 "Backpressure").
//!
//! Three independent gates bound how many mutations of each kind may be
//! in flight at once: registration, removal, and per-shard incremental
//! heartbeats. `tokio::sync::Semaphore` is used as a plain counting
//! semaphore here — `try_acquire` never suspends, matching the pure core's
//! contract that mutation handlers never await anything; only the RPC
//! layer around them may suspend (spec §5 "Suspension points").

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, TryAcquireError};

/// A permit held for the lifetime of one in-flight mutation. Dropping it
/// releases the slot back to the gate, mirroring the spec's "decremented
/// on the mutation handler, not on RPC return" rule: callers hold the
/// permit until the mutation has actually committed.
pub struct GatePermit(#[allow(dead_code)] tokio::sync::OwnedSemaphorePermit);

/// The registration semaphore (spec §4.4): capacity
/// `max-concurrent-node-registrations`.
#[derive(Debug, Clone)]
pub struct RegistrationGate {
    semaphore: Arc<Semaphore>,
}

impl RegistrationGate {
    pub fn new(capacity: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
        }
    }

    /// Returns `None` if the gate is saturated; the caller should respond
    /// `unavailable`.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                tracing::debug!(available = self.semaphore.available_permits(), "registration gate acquired");
                Some(GatePermit(permit))
            }
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                tracing::debug!("registration gate saturated");
                None
            }
        }
    }
}

/// The removal semaphore (spec §4.4): capacity
/// `max-concurrent-node-unregistrations`, draining an in-memory FIFO
/// removal queue.
#[derive(Debug, Clone)]
pub struct RemovalGate {
    semaphore: Arc<Semaphore>,
}

impl RemovalGate {
    pub fn new(capacity: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
        }
    }

    pub fn try_acquire(&self) -> Option<GatePermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(GatePermit(permit)),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                tracing::debug!("removal gate saturated");
                None
            }
        }
    }
}

/// Per-shard incremental-heartbeat concurrency limit (spec §4.4's "A
/// per-shard incremental-heartbeat concurrency limit configured
/// independently"). Shards are created lazily on first use, all sharing
/// the same configured capacity.
#[derive(Debug)]
pub struct ShardedHeartbeatGate {
    capacity: u32,
    shards: HashMap<u32, Arc<Semaphore>>,
}

impl ShardedHeartbeatGate {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            shards: HashMap::new(),
        }
    }

    pub fn try_acquire(&mut self, shard: u32) -> Option<GatePermit> {
        let semaphore = self
            .shards
            .entry(shard)
            .or_insert_with(|| Arc::new(Semaphore::new(self.capacity as usize)));
        match Arc::clone(semaphore).try_acquire_owned() {
            Ok(permit) => Some(GatePermit(permit)),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                tracing::debug!(shard, "incremental heartbeat gate saturated");
                None
            }
        }
    }
}
