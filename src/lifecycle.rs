//! Release hooks for evicted values.

use std::sync::Arc;

/// Observes the end of an entry's life.
///
/// `release` runs exactly once per evicted value, whether the eviction came
/// from an explicit removal, a replacement, or a key dying. It may run on
/// the thread that dropped the last key clone; defer heavy work and do not
/// call back into the same store.
pub trait Lifecycle<V>: Send + Sync {
    /// Called with each evicted value. The default just drops it.
    fn release(&self, value: V) {
        drop(value);
    }

    /// Whether `old` and `new` are the same object. Replacing an entry's
    /// value with the same object does not count as an eviction, so
    /// `release` is skipped for it. Must be cheap; runs on the replace path.
    fn same_value(&self, _old: &V, _new: &V) -> bool {
        false
    }
}

/// No-op lifecycle; evicted values are simply dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultLifecycle;

impl<V> Lifecycle<V> for DefaultLifecycle {}

/// Lifecycle for `Arc` values where "same object" means the same allocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArcIdentity;

impl<T> Lifecycle<Arc<T>> for ArcIdentity
where
    T: Send + Sync,
{
    fn same_value(&self, old: &Arc<T>, new: &Arc<T>) -> bool {
        Arc::ptr_eq(old, new)
    }
}
