//! Dense data-center-index allocator.
//!
//! Indices live in `[1, 16]`; index `0` means "no data center" and is
//! never handed out. Mirrors [`crate::rack_index::RackIndexAllocator`]'s
//! bitmask approach at the data center's smaller cap.

use nt_types::DataCenterIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataCenterIndexAllocator {
    used: u32,
}

impl DataCenterIndexAllocator {
    pub fn new() -> Self {
        Self { used: 0 }
    }

    /// Scans for the lowest clear bit in `[1, 16]` and marks it used.
    /// Returns `None` once all 16 slots are taken.
    pub fn allocate(&mut self) -> Option<DataCenterIndex> {
        for bit in 1..=DataCenterIndex::MAX {
            let mask = 1u32 << bit;
            if self.used & mask == 0 {
                self.used |= mask;
                return Some(DataCenterIndex::from_raw(bit));
            }
        }
        None
    }

    pub fn free(&mut self, index: DataCenterIndex) {
        if index.is_none() {
            return;
        }
        self.used &= !(1u32 << index.get());
    }

    pub fn is_used(&self, index: DataCenterIndex) -> bool {
        !index.is_none() && self.used & (1u32 << index.get()) != 0
    }

    pub fn used_count(&self) -> u32 {
        self.used.count_ones()
    }

    /// Rebuilds the allocator from the indices of every currently-live
    /// data center, as required after loading a snapshot.
    pub fn rebuild<'a>(indices: impl IntoIterator<Item = &'a DataCenterIndex>) -> Self {
        let mut allocator = Self::new();
        for index in indices {
            allocator.used |= 1u32 << index.get();
        }
        allocator
    }
}
