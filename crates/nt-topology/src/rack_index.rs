//! Dense rack-index allocator.
//!
//! Indices live in `[1, 63]`; index `0` means "no rack" and is never
//! handed out. The whole live set fits in a single 64-bit bitmask, which
//! is what lets callers elsewhere test rack membership with one AND.

use nt_types::RackIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RackIndexAllocator {
    used: u64,
}

impl RackIndexAllocator {
    pub fn new() -> Self {
        Self { used: 0 }
    }

    /// Scans for the lowest clear bit in `[1, 63]` and marks it used.
    /// Returns `None` once all 63 slots are taken.
    pub fn allocate(&mut self) -> Option<RackIndex> {
        for bit in 1..=RackIndex::MAX {
            let mask = 1u64 << bit;
            if self.used & mask == 0 {
                self.used |= mask;
                return Some(RackIndex::from_raw(bit));
            }
        }
        None
    }

    pub fn free(&mut self, index: RackIndex) {
        if index.is_none() {
            return;
        }
        self.used &= !(1u64 << index.get());
    }

    pub fn is_used(&self, index: RackIndex) -> bool {
        !index.is_none() && self.used & (1u64 << index.get()) != 0
    }

    pub fn used_count(&self) -> u32 {
        self.used.count_ones()
    }

    /// Rebuilds the allocator from the indices of every currently-live
    /// rack, as required after loading a snapshot.
    pub fn rebuild<'a>(indices: impl IntoIterator<Item = &'a RackIndex>) -> Self {
        let mut allocator = Self::new();
        for index in indices {
            allocator.used |= 1u64 << index.get();
        }
        allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_clear_bit() {
        let mut allocator = RackIndexAllocator::new();
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        assert_eq!(a.get(), 1);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn frees_and_reuses() {
        let mut allocator = RackIndexAllocator::new();
        let a = allocator.allocate().unwrap();
        let _b = allocator.allocate().unwrap();
        allocator.free(a);
        let c = allocator.allocate().unwrap();
        assert_eq!(c.get(), 1);
    }

    #[test]
    fn exhausts_at_63() {
        let mut allocator = RackIndexAllocator::new();
        for _ in 0..63 {
            allocator.allocate().unwrap();
        }
        assert!(allocator.allocate().is_none());
        assert_eq!(allocator.used_count(), 63);
    }

    #[test]
    fn rebuild_from_live_racks() {
        let indices = vec![RackIndex::from_raw(1), RackIndex::from_raw(5)];
        let allocator = RackIndexAllocator::rebuild(indices.iter());
        assert!(allocator.is_used(RackIndex::from_raw(1)));
        assert!(allocator.is_used(RackIndex::from_raw(5)));
        assert!(!allocator.is_used(RackIndex::from_raw(2)));
    }
}
