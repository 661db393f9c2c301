//! Entry slots and their lifecycle states.

use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::handle::WeakKey;
use crate::notify::Notifier;

// Lifecycle: Live -> Dying (disposer elected) -> Gone (unlinked, released).
const LIVE: u8 = 0;
const DYING: u8 = 1;
const GONE: u8 = 2;

/// The stored record behind one entry: weak handles to every key, the cached
/// hash, the value, and the disposal state.
///
/// A slot is shared between the index, its notifier, and any in-flight
/// disposer. The value is only touched under the owning shard's lock; the
/// state CAS in `begin_dispose` elects the single thread responsible for
/// tearing the slot down.
pub(crate) struct Slot<W, V> {
    pub(crate) hash: u64,
    pub(crate) keys: Box<[W]>,
    state: AtomicU8,
    pub(crate) value: Mutex<Option<V>>,
    pub(crate) notifier: Arc<Notifier>,
}

impl<W: WeakKey, V> Slot<W, V> {
    pub(crate) fn new(hash: u64, keys: Box<[W]>, value: V, notifier: Arc<Notifier>) -> Self {
        Self {
            hash,
            keys,
            state: AtomicU8::new(LIVE),
            value: Mutex::new(Some(value)),
            notifier,
        }
    }

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == LIVE
    }

    /// Elect the caller as the slot's disposer. Returns true exactly once
    /// across the slot's lifetime.
    pub(crate) fn begin_dispose(&self) -> bool {
        self.state
            .compare_exchange(LIVE, DYING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark teardown complete. Only the elected disposer calls this, after
    /// the slot has been unlinked and its value taken.
    pub(crate) fn mark_gone(&self) {
        self.state.store(GONE, Ordering::Release);
    }

    /// Whether any key of this slot has died. Such a slot can no longer
    /// match a lookup and is ready to be reaped.
    pub(crate) fn any_key_gone(&self) -> bool {
        self.keys.iter().any(|k| k.is_gone())
    }
}

impl<W, V> core::fmt::Debug for Slot<W, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Slot")
            .field("hash", &self.hash)
            .field("arity", &self.keys.len())
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish()
    }
}
