//! Entry-key probes.
//!
//! A probe is the transient form of an entry key: it borrows the caller's
//! strong key references, carries a hash computed once at construction, and
//! knows how to decide whether a resident slot is the entry it addresses. A
//! resident key is just the slot's weak handles plus its cached hash; there
//! is no separate stored key object.
//!
//! Matching is what makes dead entries unobservable: a slot whose weak
//! handle no longer resolves compares unequal to every probe, so a dying
//! entry disappears from lookups before it is unlinked from the index.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crate::handle::WeakKey;
use crate::notify::Notifier;
use crate::slot::Slot;

/// A transient entry key: addresses a resident slot without being storable.
pub(crate) trait Probe<W: WeakKey> {
    fn hash(&self) -> u64;

    /// Whether this probe addresses `slot`.
    ///
    /// Any strong handle materialized during the comparison must be parked
    /// in `pinned` instead of being dropped: the caller holds a shard lock,
    /// and dropping a final key clone there would re-enter the store.
    fn matches<V>(&self, slot: &Slot<W, V>, pinned: &mut Vec<W::Strong>) -> bool;
}

/// A probe that can also install a resident entry: it owns access to strong
/// keys, so it can mint weak handles and subscribe the slot's notifier.
pub(crate) trait InstallProbe<W: WeakKey>: Probe<W> {
    fn resident_keys(&self) -> Box<[W]>;

    /// Bind `notifier` to every key, so that any single key's death can
    /// trigger the slot's disposal.
    fn watch_keys(&self, notifier: &Arc<Notifier>);
}

/// Probe for an ordered tuple of identity-compared keys.
///
/// The hash mixes per-key allocation addresses in tuple order, so `(a, b)`
/// and `(b, a)` are distinct entries.
pub(crate) struct TupleProbe<'a, W: WeakKey> {
    keys: &'a [&'a W::Strong],
    hash: u64,
}

impl<'a, W: WeakKey> TupleProbe<'a, W> {
    pub(crate) fn new<S: BuildHasher>(keys: &'a [&'a W::Strong], hasher: &S) -> Self {
        let mut state = hasher.build_hasher();
        for key in keys {
            state.write_usize(W::id(key));
        }
        Self {
            keys,
            hash: state.finish(),
        }
    }
}

impl<'a, W: WeakKey> Probe<W> for TupleProbe<'a, W> {
    fn hash(&self) -> u64 {
        self.hash
    }

    fn matches<V>(&self, slot: &Slot<W, V>, _pinned: &mut Vec<W::Strong>) -> bool {
        if slot.keys.len() != self.keys.len() {
            return false;
        }
        // Identity needs no upgrade: the address is readable from the weak
        // handle, and a dead handle cannot match anything.
        self.keys
            .iter()
            .zip(slot.keys.iter())
            .all(|(probe, held)| !held.is_gone() && held.raw_id() == W::id(probe))
    }
}

impl<'a, W: WeakKey> InstallProbe<W> for TupleProbe<'a, W> {
    fn resident_keys(&self) -> Box<[W]> {
        self.keys.iter().map(|k| W::downgrade(k)).collect()
    }

    fn watch_keys(&self, notifier: &Arc<Notifier>) {
        for key in self.keys {
            W::watch(key, notifier);
        }
    }
}

/// Lookup probe for a single key under the referent's equality, addressed
/// through any borrowed form of it (the `Borrow` contract guarantees the
/// hash agrees with the stored referent's).
pub(crate) struct RefProbe<'a, Q: ?Sized> {
    query: &'a Q,
    hash: u64,
}

impl<'a, Q> RefProbe<'a, Q>
where
    Q: ?Sized + Hash,
{
    pub(crate) fn new<S: BuildHasher>(query: &'a Q, hasher: &S) -> Self {
        Self {
            query,
            hash: hasher.hash_one(query),
        }
    }
}

impl<'a, W, Q> Probe<W> for RefProbe<'a, Q>
where
    W: WeakKey,
    W::Referent: Borrow<Q>,
    Q: ?Sized + Eq + Hash,
{
    fn hash(&self) -> u64 {
        self.hash
    }

    fn matches<V>(&self, slot: &Slot<W, V>, pinned: &mut Vec<W::Strong>) -> bool {
        if slot.keys.len() != 1 {
            return false;
        }
        match slot.keys[0].view() {
            Some(strong) => {
                let hit = W::referent(&strong).borrow() == self.query;
                pinned.push(strong);
                hit
            }
            None => false,
        }
    }
}

/// Install-capable probe for a single key.
pub(crate) struct KeyProbe<'a, W: WeakKey> {
    key: &'a W::Strong,
    hash: u64,
}

impl<'a, W> KeyProbe<'a, W>
where
    W: WeakKey,
    W::Referent: Hash,
{
    pub(crate) fn new<S: BuildHasher>(key: &'a W::Strong, hasher: &S) -> Self {
        Self {
            key,
            hash: hasher.hash_one(W::referent(key)),
        }
    }
}

impl<'a, W> Probe<W> for KeyProbe<'a, W>
where
    W: WeakKey,
    W::Referent: Eq + Hash,
{
    fn hash(&self) -> u64 {
        self.hash
    }

    fn matches<V>(&self, slot: &Slot<W, V>, pinned: &mut Vec<W::Strong>) -> bool {
        if slot.keys.len() != 1 {
            return false;
        }
        match slot.keys[0].view() {
            Some(strong) => {
                let hit = W::referent(&strong) == W::referent(self.key);
                pinned.push(strong);
                hit
            }
            None => false,
        }
    }
}

impl<'a, W> InstallProbe<W> for KeyProbe<'a, W>
where
    W: WeakKey,
    W::Referent: Eq + Hash,
{
    fn resident_keys(&self) -> Box<[W]> {
        Box::new([W::downgrade(self.key)])
    }

    fn watch_keys(&self, notifier: &Arc<Notifier>) {
        W::watch(self.key, notifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;
    use std::sync::Weak;

    fn resident(
        probe: &TupleProbe<'_, Weak<u32>>,
    ) -> Slot<Weak<u32>, i32> {
        Slot::new(
            probe.hash(),
            probe.resident_keys(),
            0,
            Arc::new(Notifier::new(Box::new(|| {}))),
        )
    }

    /// Invariant: tuple hashing and equality are positional; swapping two
    /// keys addresses a different entry.
    #[test]
    fn tuple_probe_is_order_sensitive() {
        let s = RandomState::new();
        let a = Arc::new(1u32);
        let b = Arc::new(2u32);
        let fwd = [&a, &b];
        let rev = [&b, &a];
        let ab = TupleProbe::<Weak<u32>>::new(&fwd, &s);
        let ba = TupleProbe::<Weak<u32>>::new(&rev, &s);
        assert_ne!(ab.hash(), ba.hash());

        let slot = resident(&ab);
        let mut pinned = Vec::new();
        assert!(ab.matches(&slot, &mut pinned));
        assert!(!ba.matches(&slot, &mut pinned));
    }

    /// Invariant: arity is part of the key; a prefix tuple does not match.
    #[test]
    fn tuple_probe_checks_arity() {
        let s = RandomState::new();
        let a = Arc::new(1u32);
        let b = Arc::new(2u32);
        let pair = [&a, &b];
        let single = [&a];
        let ab = TupleProbe::<Weak<u32>>::new(&pair, &s);
        let slot = resident(&ab);
        let just_a = TupleProbe::<Weak<u32>>::new(&single, &s);
        let mut pinned = Vec::new();
        assert!(!just_a.matches(&slot, &mut pinned));
    }

    /// Invariant: once any key of a resident slot dies, no probe matches it,
    /// even a probe built from the surviving keys plus a same-address ghost.
    #[test]
    fn dead_key_matches_nothing() {
        let s = RandomState::new();
        let a = Arc::new(1u32);
        let b = Arc::new(2u32);
        let slot = {
            let pair = [&a, &b];
            let probe = TupleProbe::<Weak<u32>>::new(&pair, &s);
            let slot = resident(&probe);
            let mut pinned = Vec::new();
            assert!(probe.matches(&slot, &mut pinned));
            slot
        };
        drop(b);
        let doubled = [&a, &a];
        let probe_again = TupleProbe::<Weak<u32>>::new(&doubled, &s);
        let mut pinned = Vec::new();
        assert!(!probe_again.matches(&slot, &mut pinned));
    }

    /// Invariant: a borrowed-form probe resolves the same entry as the key
    /// it was stored under, and a distinct-but-equal key also resolves it.
    #[test]
    fn ref_probe_uses_referent_equality() {
        let s = RandomState::new();
        let stored = Arc::new("hello".to_string());
        let install = KeyProbe::<Weak<String>>::new(&stored, &s);
        let slot = Slot::new(
            install.hash(),
            install.resident_keys(),
            7i32,
            Arc::new(Notifier::new(Box::new(|| {}))),
        );

        let mut pinned = Vec::new();
        let by_str = RefProbe::new("hello", &s);
        assert_eq!(Probe::<Weak<String>>::hash(&by_str), install.hash());
        assert!(by_str.matches(&slot, &mut pinned));

        let twin = Arc::new("hello".to_string());
        let by_twin = KeyProbe::<Weak<String>>::new(&twin, &s);
        assert!(by_twin.matches(&slot, &mut pinned));

        let miss = RefProbe::new("world", &s);
        assert!(!Probe::<Weak<String>>::matches(&miss, &slot, &mut pinned));

        // Upgraded strongs were parked, not dropped.
        assert!(pinned.len() >= 2);
    }
}
