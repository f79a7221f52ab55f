//! Hardware block slot accounting

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use rocscope_shared::BlockKey;

/// Slot usage of one block instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockAllocation {
    /// Capacity reported by the hardware
    pub max_slots: u32,

    /// Slots handed out so far; never exceeds `max_slots`
    pub claimed_slots: u32,
}

impl BlockAllocation {
    pub fn is_full(&self) -> bool {
        self.claimed_slots >= self.max_slots
    }
}

/// Outcome of a slot claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Granted { max_slots: u32 },
    Full { max_slots: u32 },
}

/// Tracks slot claims per block instance for one allocation pass. Each block's
/// capacity is queried the first time the block is seen and cached after that.
#[derive(Debug, Default)]
pub struct BlockAllocator {
    blocks: BTreeMap<BlockKey, BlockAllocation>,
}

impl BlockAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim<E, F>(&mut self, key: BlockKey, query: F) -> Result<Claim, E>
    where
        F: FnOnce() -> Result<u32, E>,
    {
        let allocation = match self.blocks.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(BlockAllocation {
                max_slots: query()?,
                claimed_slots: 0,
            }),
        };

        if allocation.is_full() {
            return Ok(Claim::Full {
                max_slots: allocation.max_slots,
            });
        }
        allocation.claimed_slots += 1;
        Ok(Claim::Granted {
            max_slots: allocation.max_slots,
        })
    }

    pub fn allocation(&self, key: &BlockKey) -> Option<&BlockAllocation> {
        self.blocks.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BlockKey, &BlockAllocation)> {
        self.blocks.iter()
    }
}
