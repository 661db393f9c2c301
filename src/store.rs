//! Shared store core: the operation bodies and the reclamation protocol
//! behind both public containers.
//!
//! An entry dies through exactly one path. Whoever first wins the slot's
//! Live -> Dying election (an explicit removal, a replacement, a sweep, or
//! the notifier fired by a dying key) unlinks the slot from its shard by
//! identity, takes the value, and runs the release hook once, outside all
//! locks. Everyone else sees either the intact entry or no entry at all.

use core::hash::BuildHasher;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use hashbrown::hash_table::Entry;

use crate::error::StoreError;
use crate::handle::WeakKey;
use crate::index::{Index, Shard};
use crate::key::{InstallProbe, Probe};
use crate::lifecycle::Lifecycle;
use crate::notify::Notifier;
use crate::slot::Slot;

pub(crate) fn default_shards() -> usize {
    std::thread::available_parallelism()
        .map_or(4, |n| n.get())
        .next_power_of_two()
        .min(64)
}

pub(crate) struct Core<W, V, L, S> {
    index: Index<W, V>,
    hasher: S,
    lifecycle: L,
    // Handed to each slot's notifier so a key drop can find its way back.
    self_ref: Weak<Self>,
}

impl<W, V, L, S> Core<W, V, L, S>
where
    W: WeakKey,
    V: Clone + Send + 'static,
    L: Lifecycle<V> + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    pub(crate) fn new(hasher: S, lifecycle: L, shards: usize) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            index: Index::new(shards),
            hasher,
            lifecycle,
            self_ref: weak.clone(),
        })
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn lookup<P: Probe<W>>(&self, probe: &P) -> Option<V> {
        let mut pinned = Vec::new();
        let cell = self.index.shard(probe.hash());
        cell.reentrancy.check();
        let value = {
            let shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            shard
                .table
                .find(probe.hash(), |s| s.is_live() && probe.matches(s, &mut pinned))
                .map(|slot| {
                    slot.value
                        .lock()
                        .clone()
                        .expect("live indexed slot holds a value")
                })
        };
        // Dropped only now: releasing a final key clone under the shard
        // lock would re-enter the store from the key's drop hook.
        drop(pinned);
        value
    }

    pub(crate) fn contains<P: Probe<W>>(&self, probe: &P) -> bool {
        let mut pinned = Vec::new();
        let cell = self.index.shard(probe.hash());
        cell.reentrancy.check();
        let found = {
            let shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            shard
                .table
                .find(probe.hash(), |s| s.is_live() && probe.matches(s, &mut pinned))
                .is_some()
        };
        drop(pinned);
        found
    }

    /// Fetch the entry's value, installing one from `make` if absent.
    ///
    /// `make` runs inside the shard's critical section: concurrent callers
    /// for the same key block until the winner has installed, so the
    /// factory runs at most once per installed entry. It must not touch
    /// this store.
    pub(crate) fn fetch_or_install<P, F>(&self, probe: &P, make: F) -> V
    where
        P: InstallProbe<W>,
        F: FnOnce() -> V,
    {
        let mut pinned = Vec::new();
        let cell = self.index.shard(probe.hash());
        cell.reentrancy.check();
        let mut reaped = Vec::new();
        let value = {
            let mut shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            let value = match shard.table.entry(
                probe.hash(),
                |s| s.is_live() && probe.matches(s, &mut pinned),
                |s| s.hash,
            ) {
                Entry::Occupied(entry) => entry
                    .get()
                    .value
                    .lock()
                    .clone()
                    .expect("live indexed slot holds a value"),
                Entry::Vacant(vacant) => {
                    let value = make();
                    let kept = value.clone();
                    let _ = vacant.insert(self.new_slot(probe, value));
                    kept
                }
            };
            if shard.note_op() {
                let dead = shard.expired();
                reaped = Self::reap_locked(&mut shard, dead);
            }
            value
        };
        drop(pinned);
        self.finish_reaped(reaped);
        value
    }

    /// Insert or replace. Returns the previous value if one was replaced;
    /// the previous value is released unless the lifecycle says the caller
    /// reinstalled the same object.
    pub(crate) fn put<P: InstallProbe<W>>(&self, probe: &P, value: V) -> Option<V> {
        let mut pinned = Vec::new();
        let cell = self.index.shard(probe.hash());
        cell.reentrancy.check();
        let mut reaped = Vec::new();
        let replaced = {
            let mut shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            let replaced = match shard.table.entry(
                probe.hash(),
                |s| s.is_live() && probe.matches(s, &mut pinned),
                |s| s.hash,
            ) {
                Entry::Occupied(entry) => {
                    let installed = value.clone();
                    let old = entry
                        .get()
                        .value
                        .lock()
                        .replace(value)
                        .expect("live indexed slot holds a value");
                    Some((old, installed))
                }
                Entry::Vacant(vacant) => {
                    let _ = vacant.insert(self.new_slot(probe, value));
                    None
                }
            };
            if shard.note_op() {
                let dead = shard.expired();
                reaped = Self::reap_locked(&mut shard, dead);
            }
            replaced
        };
        drop(pinned);
        self.finish_reaped(reaped);
        let (old, installed) = replaced?;
        if !self.lifecycle.same_value(&old, &installed) {
            self.release_value(old.clone());
        }
        Some(old)
    }

    /// Insert only if absent; `DuplicateKey` if a live entry exists.
    pub(crate) fn add_new<P: InstallProbe<W>>(
        &self,
        probe: &P,
        value: V,
    ) -> Result<(), StoreError> {
        let mut pinned = Vec::new();
        let cell = self.index.shard(probe.hash());
        cell.reentrancy.check();
        let mut reaped = Vec::new();
        let outcome = {
            let mut shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            let outcome = match shard.table.entry(
                probe.hash(),
                |s| s.is_live() && probe.matches(s, &mut pinned),
                |s| s.hash,
            ) {
                Entry::Occupied(_) => Err(StoreError::DuplicateKey),
                Entry::Vacant(vacant) => {
                    let _ = vacant.insert(self.new_slot(probe, value));
                    Ok(())
                }
            };
            if shard.note_op() {
                let dead = shard.expired();
                reaped = Self::reap_locked(&mut shard, dead);
            }
            outcome
        };
        drop(pinned);
        self.finish_reaped(reaped);
        outcome
    }

    /// Remove the entry if present and live. Returns the removed value;
    /// the release hook has already run for it.
    pub(crate) fn take<P: Probe<W>>(&self, probe: &P) -> Option<V> {
        let mut pinned = Vec::new();
        let cell = self.index.shard(probe.hash());
        cell.reentrancy.check();
        let taken = {
            let mut shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            let found = shard
                .table
                .find(probe.hash(), |s| s.is_live() && probe.matches(s, &mut pinned))
                .cloned();
            match found {
                // A lost election means a key death beat us to it; the
                // winner releases, and this entry is already unobservable.
                Some(slot) if slot.begin_dispose() => {
                    shard.unlink(&slot);
                    let value = slot
                        .value
                        .lock()
                        .take()
                        .expect("elected disposer takes the live value");
                    Some((slot, value))
                }
                _ => None,
            }
        };
        drop(pinned);
        let (slot, value) = taken?;
        slot.notifier.disarm();
        slot.mark_gone();
        self.release_value(value.clone());
        Some(value)
    }

    /// Dispose driven by a key death: the slot's notifier lands here.
    pub(crate) fn reclaim(&self, slot: &Weak<Slot<W, V>>) {
        let Some(slot) = slot.upgrade() else { return };
        if !slot.begin_dispose() {
            return;
        }
        let cell = self.index.shard(slot.hash);
        cell.reentrancy.check();
        let value = {
            let mut shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            shard.unlink(&slot);
            slot.value
                .lock()
                .take()
                .expect("elected disposer takes the live value")
        };
        slot.notifier.disarm();
        slot.mark_gone();
        tracing::debug!("entry reclaimed after key death");
        self.release_value(value);
    }

    /// Sweep every shard, disposing entries whose keys have died.
    /// Returns how many values were released.
    pub(crate) fn purge(&self) -> usize {
        let mut released = 0;
        for cell in self.index.cells() {
            cell.reentrancy.check();
            let reaped = {
                let mut shard = cell.map.lock();
                let _g = cell.reentrancy.enter();
                let dead = shard.expired();
                Self::reap_locked(&mut shard, dead)
            };
            released += self.finish_reaped(reaped);
        }
        if released > 0 {
            tracing::trace!(released, "purge swept dead entries");
        }
        released
    }

    /// Drop every entry, releasing each live value exactly once.
    pub(crate) fn clear(&self) {
        for cell in self.index.cells() {
            cell.reentrancy.check();
            let drained: Vec<Arc<Slot<W, V>>> = {
                let mut shard = cell.map.lock();
                let _g = cell.reentrancy.enter();
                shard.table.drain().collect()
            };
            let mut values = Vec::new();
            for slot in drained {
                if slot.begin_dispose() {
                    let value = slot
                        .value
                        .lock()
                        .take()
                        .expect("elected disposer takes the live value");
                    slot.notifier.disarm();
                    slot.mark_gone();
                    values.push(value);
                }
            }
            for value in values {
                self.release_value(value);
            }
        }
    }

    /// Strong snapshot of every live single-key entry, for iteration.
    pub(crate) fn snapshot(&self) -> Vec<(W::Strong, V)> {
        let mut entries = Vec::new();
        for cell in self.index.cells() {
            cell.reentrancy.check();
            let shard = cell.map.lock();
            let _g = cell.reentrancy.enter();
            for slot in shard.table.iter() {
                if !slot.is_live() || slot.keys.len() != 1 {
                    continue;
                }
                let Some(key) = slot.keys[0].view() else {
                    continue;
                };
                let value = slot
                    .value
                    .lock()
                    .clone()
                    .expect("live indexed slot holds a value");
                entries.push((key, value));
            }
        }
        entries
    }

    fn new_slot<P: InstallProbe<W>>(&self, probe: &P, value: V) -> Arc<Slot<W, V>> {
        let hash = probe.hash();
        let keys = probe.resident_keys();
        let core = self.self_ref.clone();
        let slot = Arc::new_cyclic(|weak_slot: &Weak<Slot<W, V>>| {
            let weak_slot = weak_slot.clone();
            let notifier = Arc::new(Notifier::new(Box::new(move || {
                if let Some(core) = core.upgrade() {
                    core.reclaim(&weak_slot);
                }
            })));
            Slot::new(hash, keys, value, notifier)
        });
        probe.watch_keys(&slot.notifier);
        slot
    }

    /// Dispose `dead` slots inside a locked shard. Returns the stripped
    /// slots and values; the caller finishes them after unlocking.
    fn reap_locked(
        shard: &mut Shard<W, V>,
        dead: Vec<Arc<Slot<W, V>>>,
    ) -> Vec<(Arc<Slot<W, V>>, V)> {
        let mut reaped = Vec::with_capacity(dead.len());
        for slot in dead {
            if slot.begin_dispose() {
                shard.unlink(&slot);
                let value = slot
                    .value
                    .lock()
                    .take()
                    .expect("elected disposer takes the live value");
                reaped.push((slot, value));
            }
        }
        reaped
    }

    fn finish_reaped(&self, reaped: Vec<(Arc<Slot<W, V>>, V)>) -> usize {
        let released = reaped.len();
        for (slot, value) in reaped {
            slot.notifier.disarm();
            slot.mark_gone();
            self.release_value(value);
        }
        released
    }

    /// Run the release hook, isolating panics: reclamation must never be
    /// aborted by user code.
    fn release_value(&self, value: V) {
        if catch_unwind(AssertUnwindSafe(|| self.lifecycle.release(value))).is_err() {
            tracing::error!("release hook panicked; entry already reclaimed");
        }
    }
}
