//! Sharded concurrent index mapping entry keys to slots.
//!
//! Each shard is a `hashbrown::HashTable` of `Arc<Slot>` behind its own
//! mutex, probed with explicit hash/equality pairs. Removal is by slot
//! identity, never by key equality: a disposer may only unlink the exact
//! slot it was elected for, so a replacement installed under the same key
//! is safe from stale disposers.

use std::sync::Arc;

use hashbrown::HashTable;
use parking_lot::Mutex;

use crate::handle::WeakKey;
use crate::reentrancy::DebugReentrancy;
use crate::slot::Slot;

/// One shard's table plus its amortized-sweep bookkeeping. Always accessed
/// under the owning [`ShardCell`]'s mutex.
pub(crate) struct Shard<W, V> {
    pub(crate) table: HashTable<Arc<Slot<W, V>>>,
    ops_since_sweep: usize,
}

impl<W: WeakKey, V> Shard<W, V> {
    fn new() -> Self {
        Self {
            table: HashTable::new(),
            ops_since_sweep: 0,
        }
    }

    /// Record a mutating operation; true when this shard is due for an
    /// amortized sweep of dead entries.
    pub(crate) fn note_op(&mut self) -> bool {
        self.ops_since_sweep += 1;
        if self.ops_since_sweep > 16 + self.table.len() / 2 {
            self.ops_since_sweep = 0;
            true
        } else {
            false
        }
    }

    /// Slots whose keys have died but which have not been disposed yet.
    pub(crate) fn expired(&self) -> Vec<Arc<Slot<W, V>>> {
        self.table
            .iter()
            .filter(|slot| slot.is_live() && slot.any_key_gone())
            .cloned()
            .collect()
    }

    /// Unlink exactly `slot` (by identity). Misses are fine: the slot may
    /// already have been drained by `clear` or replaced under its key.
    pub(crate) fn unlink(&mut self, slot: &Arc<Slot<W, V>>) -> bool {
        match self
            .table
            .find_entry(slot.hash, |s| Arc::ptr_eq(s, slot))
        {
            Ok(occupied) => {
                occupied.remove();
                true
            }
            Err(_) => false,
        }
    }
}

/// A shard and the reentrancy tracker guarding its lock.
pub(crate) struct ShardCell<W, V> {
    pub(crate) reentrancy: DebugReentrancy,
    pub(crate) map: Mutex<Shard<W, V>>,
}

pub(crate) struct Index<W, V> {
    cells: Box<[ShardCell<W, V>]>,
    mask: usize,
}

impl<W: WeakKey, V> Index<W, V> {
    pub(crate) fn new(shards: usize) -> Self {
        let shards = shards.max(1).next_power_of_two();
        let cells = std::iter::repeat_with(|| ShardCell {
            reentrancy: DebugReentrancy::new(),
            map: Mutex::new(Shard::new()),
        })
        .take(shards)
        .collect();
        Self {
            cells,
            mask: shards - 1,
        }
    }

    /// The shard owning `hash`. Selection uses high hash bits so it stays
    /// independent of the in-shard bucket choice.
    pub(crate) fn shard(&self, hash: u64) -> &ShardCell<W, V> {
        &self.cells[((hash >> 32) as usize) & self.mask]
    }

    pub(crate) fn cells(&self) -> impl Iterator<Item = &ShardCell<W, V>> {
        self.cells.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.iter().map(|c| c.map.lock().table.len()).sum()
    }
}
