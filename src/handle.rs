//! Weak key handles.
//!
//! Containers in this crate never own their keys: each stored key is held
//! through a type implementing [`WeakKey`], a strong/weak pointer pair in
//! the style of `std::sync::{Arc, Weak}`. The plain `Weak<T>` implementation
//! reclaims lazily (dead entries become unobservable immediately and are
//! swept out of the index later); [`Observed<T>`] keys additionally deliver a
//! drop notification so the entry is torn down on the thread that dropped
//! the last clone.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::notify::Notifier;

/// A weak handle to a key allocation.
///
/// `Strong` is the form callers pass in and get back; `Referent` is the
/// payload the single-key table hashes and compares. Identity (for tuple
/// stores) is the address of the underlying allocation, which stays valid
/// for comparison even after the referent is gone.
pub trait WeakKey: Sized + Send + Sync + 'static {
    /// Owning form of the key.
    type Strong: Clone;
    /// Payload the user comparator sees.
    type Referent: ?Sized;

    fn downgrade(strong: &Self::Strong) -> Self;

    /// Upgrade back to a strong handle, or `None` once the key is gone.
    fn view(&self) -> Option<Self::Strong>;

    /// Whether the referent has been dropped. Unlike `view`, this never
    /// materializes a strong handle, so it is safe to call under locks.
    fn is_gone(&self) -> bool;

    /// Allocation address of a live key.
    fn id(strong: &Self::Strong) -> usize;

    /// Allocation address recorded in this handle; comparable with
    /// [`WeakKey::id`] whether or not the referent is still alive.
    fn raw_id(&self) -> usize;

    fn referent(strong: &Self::Strong) -> &Self::Referent;

    /// Ask the key to fire `notifier` when it becomes unreachable.
    ///
    /// Handles without a drop hook (plain `Weak<T>`) ignore this; their
    /// entries are found by sweeps instead.
    fn watch(_strong: &Self::Strong, _notifier: &Arc<Notifier>) {}
}

impl<T: Send + Sync + 'static> WeakKey for Weak<T> {
    type Strong = Arc<T>;
    type Referent = T;

    fn downgrade(strong: &Arc<T>) -> Self {
        Arc::downgrade(strong)
    }

    fn view(&self) -> Option<Arc<T>> {
        self.upgrade()
    }

    fn is_gone(&self) -> bool {
        self.strong_count() == 0
    }

    fn id(strong: &Arc<T>) -> usize {
        Arc::as_ptr(strong) as usize
    }

    fn raw_id(&self) -> usize {
        self.as_ptr() as usize
    }

    fn referent(strong: &Arc<T>) -> &T {
        strong
    }
}

struct ObservedCore<T> {
    value: T,
    watchers: Mutex<Vec<Weak<Notifier>>>,
}

impl<T> Drop for ObservedCore<T> {
    fn drop(&mut self) {
        // Take the list first: firing runs store code that may subscribe
        // other keys, and must not run under the watcher lock.
        let watchers = std::mem::take(&mut *self.watchers.lock());
        for watcher in watchers {
            if let Some(notifier) = watcher.upgrade() {
                notifier.fire();
            }
        }
    }
}

/// A shared key whose last-clone drop notifies the stores it is used in.
///
/// Behaves like an `Arc<T>` for the caller: cheap to clone, derefs to `T`.
/// Entries keyed by `Observed` values are reclaimed promptly on the thread
/// that drops the final clone, instead of waiting for a sweep.
pub struct Observed<T> {
    inner: Arc<ObservedCore<T>>,
}

impl<T> Observed<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(ObservedCore {
                value,
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Whether two handles point at the same allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T> Clone for Observed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Deref for Observed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for Observed<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Observed").field(&self.inner.value).finish()
    }
}

/// Weak handle to an [`Observed`] key.
pub struct WeakObserved<T>(Weak<ObservedCore<T>>);

impl<T: Send + Sync + 'static> WeakKey for WeakObserved<T> {
    type Strong = Observed<T>;
    type Referent = T;

    fn downgrade(strong: &Observed<T>) -> Self {
        WeakObserved(Arc::downgrade(&strong.inner))
    }

    fn view(&self) -> Option<Observed<T>> {
        self.0.upgrade().map(|inner| Observed { inner })
    }

    fn is_gone(&self) -> bool {
        self.0.strong_count() == 0
    }

    fn id(strong: &Observed<T>) -> usize {
        Arc::as_ptr(&strong.inner) as usize
    }

    fn raw_id(&self) -> usize {
        self.0.as_ptr() as usize
    }

    fn referent(strong: &Observed<T>) -> &T {
        &strong.inner.value
    }

    fn watch(strong: &Observed<T>, notifier: &Arc<Notifier>) {
        let mut watchers = strong.inner.watchers.lock();
        // Disposed entries leave dead subscriptions behind; prune them
        // here so a long-lived key's list stays bounded under churn.
        watchers.retain(|w| w.strong_count() > 0);
        watchers.push(Arc::downgrade(notifier));
    }
}
