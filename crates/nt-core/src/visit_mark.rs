//! Process-wide visit-mark allocator.
//!
//! The only legitimate piece of global process-wide state in the tracker:
//! a monotonic counter used to mark nodes as "visited" during a traversal
//! (e.g. a replicator walking every node once per scheduling tick) without
//! needing to clear a per-node flag between traversals. Teardown-safe
//! because only increment is exposed.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VISIT_MARK: AtomicU64 = AtomicU64::new(1);

/// Allocates the next visit mark. Never returns zero, so zero can be used
/// as a per-node "never visited" sentinel.
pub fn generate_visit_mark() -> u64 {
    NEXT_VISIT_MARK.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_strictly_increasing() {
        let a = generate_visit_mark();
        let b = generate_visit_mark();
        assert!(b > a);
    }
}
