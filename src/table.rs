//! Single-key weak table with non-identity lookup.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;
use std::sync::Arc;

use crate::error::StoreError;
use crate::handle::WeakKey;
use crate::key::{KeyProbe, RefProbe};
use crate::lifecycle::{DefaultLifecycle, Lifecycle};
use crate::store::{default_shards, Core};

/// A thread-safe map whose entries live only while their key is alive
/// outside the table.
///
/// Unlike [`MultiKeyWeakStore`](crate::MultiKeyWeakStore), the key is
/// compared by the referent's `Eq`/`Hash`, so a distinct but equal key
/// instance addresses the same entry, and lookups work through any borrowed
/// form of the key (`&str` for `Weak<String>` keys, like a standard map).
///
/// ```
/// use std::sync::{Arc, Weak};
/// use weak_store::WeakTable;
///
/// let table: WeakTable<Weak<String>, u32> = WeakTable::new();
/// let k = Arc::new("config".to_string());
/// table.insert(&k, 7);
///
/// assert_eq!(table.get("config"), Some(7));
///
/// drop(k);
/// assert_eq!(table.get("config"), None);
/// table.purge();
/// assert!(table.is_empty());
/// ```
pub struct WeakTable<W, V, L = DefaultLifecycle, S = RandomState> {
    core: Arc<Core<W, V, L, S>>,
}

impl<W, V> WeakTable<W, V>
where
    W: WeakKey,
    W::Referent: Eq + Hash,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_hasher_and_lifecycle(RandomState::default(), DefaultLifecycle)
    }
}

impl<W, V> Default for WeakTable<W, V>
where
    W: WeakKey,
    W::Referent: Eq + Hash,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<W, V, L, S> WeakTable<W, V, L, S>
where
    W: WeakKey,
    W::Referent: Eq + Hash,
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

    /// Build a table with a custom release hook.
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

    fn key_probe<'a>(&self, key: &'a W::Strong) -> KeyProbe<'a, W> {
        KeyProbe::new(key, self.core.hasher())
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        W::Referent: Borrow<Q>,
        Q: ?Sized + Eq + Hash,
    {
        self.core.lookup(&RefProbe::new(key, self.core.hasher()))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        W::Referent: Borrow<Q>,
        Q: ?Sized + Eq + Hash,
    {
        self.core.contains(&RefProbe::new(key, self.core.hasher()))
    }

    /// Fetch the value for `key`, installing `make()` if absent.
    ///
    /// `make` runs at most once per installed entry, inside the table's
    /// insertion critical section; it must be short and must not call back
    /// into this table. A panic in `make` installs nothing.
    pub fn get_or_insert_with<F>(&self, key: &W::Strong, make: F) -> V
    where
        F: FnOnce() -> V,
    {
        self.core.fetch_or_install(&self.key_probe(key), make)
    }

    /// Insert or replace; `None` removes.
    ///
    /// Returns the previous value when there was one. A replaced value is
    /// released unless the lifecycle reports it is the same object as the
    /// new one; a removed value is always released.
    pub fn set(&self, key: &W::Strong, value: Option<V>) -> Option<V> {
        match value {
            Some(value) => self.core.put(&self.key_probe(key), value),
            None => self.core.take(&self.key_probe(key)),
        }
    }

    pub fn insert(&self, key: &W::Strong, value: V) -> Option<V> {
        self.set(key, Some(value))
    }

    /// Insert only if `key` has no live entry.
    pub fn add(&self, key: &W::Strong, value: V) -> Result<(), StoreError> {
        self.core.add_new(&self.key_probe(key), value)
    }

    /// Like [`add`](WeakTable::add), but reports a duplicate as `false`.
    pub fn try_add(&self, key: &W::Strong, value: V) -> bool {
        self.add(key, value).is_ok()
    }

    /// Remove the entry if present. True when this call evicted it.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        W::Referent: Borrow<Q>,
        Q: ?Sized + Eq + Hash,
    {
        self.core
            .take(&RefProbe::new(key, self.core.hasher()))
            .is_some()
    }

    /// Snapshot iterator over the live entries.
    ///
    /// Each yielded pair holds a strong key handle, so the snapshot pins
    /// those keys while it is alive: consume it promptly and do not stash
    /// the handles, or the entries cannot be reclaimed. Entries inserted or
    /// evicted concurrently may or may not appear; order is unspecified.
    pub fn iter(&self) -> Iter<W, V> {
        Iter {
            entries: self.core.snapshot().into_iter(),
        }
    }

    /// Snapshot of the live keys. Same pinning contract as
    /// [`iter`](WeakTable::iter).
    pub fn keys(&self) -> Keys<W, V> {
        Keys(self.iter())
    }

    /// Snapshot of the live values.
    pub fn values(&self) -> Values<W, V> {
        Values(self.iter())
    }

    /// Sweep the whole table, releasing every entry whose key has died.
    /// Returns the number of values released.
    pub fn purge(&self) -> usize {
        self.core.purge()
    }

    /// Remove and release every entry.
    pub fn clear(&self) {
        self.core.clear()
    }

    /// Number of indexed entries. Entries whose key died but which have not
    /// been swept yet are still counted, even though they no longer match
    /// lookups.
    pub fn len(&self) -> usize {
        self.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot iterator over a table's `(key, value)` pairs.
pub struct Iter<W: WeakKey, V> {
    entries: std::vec::IntoIter<(W::Strong, V)>,
}

impl<W: WeakKey, V> Iterator for Iter<W, V> {
    type Item = (W::Strong, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

/// Snapshot iterator over a table's keys.
pub struct Keys<W: WeakKey, V>(Iter<W, V>);

impl<W: WeakKey, V> Iterator for Keys<W, V> {
    type Item = W::Strong;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }
}

/// Snapshot iterator over a table's values.
pub struct Values<W: WeakKey, V>(Iter<W, V>);

impl<W: WeakKey, V> Iterator for Values<W, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }
}
