//! Tuple-keyed weak store.

use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;
use std::sync::Arc;

use crate::error::StoreError;
use crate::handle::WeakKey;
use crate::key::TupleProbe;
use crate::lifecycle::{DefaultLifecycle, Lifecycle};
use crate::store::{default_shards, Core};

/// A thread-safe map from an ordered tuple of keys to a value, where the
/// entry lives only while *every* key is alive outside the store.
///
/// Keys are compared by identity (allocation address), position by
/// position; `(a, b)` and `(b, a)` are different entries. The store never
/// keeps a key alive. Once any key dies the entry stops matching lookups
/// immediately and its value is released: on the dropping thread for
/// [`Observed`](crate::Observed) keys, otherwise during a later sweep or an
/// explicit [`purge`](MultiKeyWeakStore::purge).
///
/// ```
/// use std::sync::{Arc, Weak};
/// use weak_store::MultiKeyWeakStore;
///
/// let store: MultiKeyWeakStore<Weak<String>, u32> = MultiKeyWeakStore::new();
/// let user = Arc::new("user-7".to_string());
/// let session = Arc::new("session-9".to_string());
///
/// store.insert(&[&user, &session], 1)?;
/// assert_eq!(store.get(&[&user, &session])?, Some(1));
///
/// drop(session);
/// assert_eq!(store.get(&[&user])?, None);
/// store.purge();
/// assert!(store.is_empty());
/// # Ok::<(), weak_store::StoreError>(())
/// ```
pub struct MultiKeyWeakStore<W, V, L = DefaultLifecycle, S = RandomState> {
    core: Arc<Core<W, V, L, S>>,
}

impl<W, V> MultiKeyWeakStore<W, V>
where
    W: WeakKey,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_hasher_and_lifecycle(RandomState::default(), DefaultLifecycle)
    }
}

impl<W, V> Default for MultiKeyWeakStore<W, V>
where
    W: WeakKey,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W, V, L, S> MultiKeyWeakStore<W, V, L, S>
where
    W: WeakKey,
    V: Clone + Send + 'static,
    L: Lifecycle<V> + 'static,
    S: BuildHasher + Send + Sync + 'static,
{
    pub fn with_hasher(hasher: S) -> Self
    where
        L: Default,
    {
        Self::with_hasher_and_lifecycle(hasher, L::default())
    }

    /// Build a store with a custom release hook.
    pub fn with_lifecycle(lifecycle: L) -> Self
    where
        S: Default,
    {
        Self::with_hasher_and_lifecycle(S::default(), lifecycle)
    }

    pub fn with_hasher_and_lifecycle(hasher: S, lifecycle: L) -> Self {
        Self {
            core: Core::new(hasher, lifecycle, default_shards()),
        }
    }

    fn probe<'a>(&self, keys: &'a [&'a W::Strong]) -> Result<TupleProbe<'a, W>, StoreError> {
        if keys.is_empty() {
            return Err(StoreError::EmptyKeys);
        }
        Ok(TupleProbe::new(keys, self.core.hasher()))
    }

    pub fn get(&self, keys: &[&W::Strong]) -> Result<Option<V>, StoreError> {
        Ok(self.core.lookup(&self.probe(keys)?))
    }

    pub fn contains(&self, keys: &[&W::Strong]) -> Result<bool, StoreError> {
        Ok(self.core.contains(&self.probe(keys)?))
    }

    /// Fetch the value for `keys`, installing `make()` if absent.
    ///
    /// `make` runs at most once per installed entry, inside the store's
    /// insertion critical section; it must be short and must not call back
    /// into this store. A panic in `make` installs nothing.
    pub fn get_or_insert_with<F>(&self, keys: &[&W::Strong], make: F) -> Result<V, StoreError>
    where
        F: FnOnce() -> V,
    {
        Ok(self.core.fetch_or_install(&self.probe(keys)?, make))
    }

    /// Insert or replace; `None` removes.
    ///
    /// Returns the previous value when there was one. A replaced value is
    /// released unless the lifecycle reports it is the same object as the
    /// new one; a removed value is always released.
    pub fn set(&self, keys: &[&W::Strong], value: Option<V>) -> Result<Option<V>, StoreError> {
        let probe = self.probe(keys)?;
        Ok(match value {
            Some(value) => self.core.put(&probe, value),
            None => self.core.take(&probe),
        })
    }

    pub fn insert(&self, keys: &[&W::Strong], value: V) -> Result<Option<V>, StoreError> {
        self.set(keys, Some(value))
    }

    /// Remove the entry if present. True when this call evicted it.
    pub fn remove(&self, keys: &[&W::Strong]) -> Result<bool, StoreError> {
        Ok(self.core.take(&self.probe(keys)?).is_some())
    }

    /// Sweep the whole index, releasing every entry whose keys have died.
    /// Returns the number of values released.
    pub fn purge(&self) -> usize {
        self.core.purge()
    }

    /// Remove and release every entry.
    pub fn clear(&self) {
        self.core.clear()
    }

    /// Number of indexed entries. Entries whose keys died but which have
    /// not been swept yet are still counted, even though they no longer
    /// match lookups.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
