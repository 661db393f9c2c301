//! Debug-only reentrancy guard.
//!
//! Detects the current thread re-entering a shard it already holds, which
//! would otherwise deadlock on the shard mutex. `check` runs before the
//! lock is taken; `enter` records the holder once the lock is held. In
//! release builds both compile to no-ops.

#[cfg(not(debug_assertions))]
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(debug_assertions)]
fn thread_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TOKEN: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|t| *t)
}

/// Per-shard reentrancy tracker. Guard entry points with
/// `reentrancy.check()` before locking and `let _g = reentrancy.enter();`
/// after.
#[derive(Debug)]
pub(crate) struct DebugReentrancy {
    // 0 = no holder; otherwise the token of the thread inside the shard.
    #[cfg(debug_assertions)]
    holder: AtomicU64,
}

impl DebugReentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            holder: AtomicU64::new(0),
        }
    }

    /// Panics in debug builds if the current thread is already inside this
    /// shard. Called before acquiring the shard lock.
    #[inline]
    pub(crate) fn check(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(
                self.holder.load(Ordering::Acquire) != thread_token(),
                "reentrancy detected: store operation started from inside \
                 a factory, comparator, or key drop of the same store"
            );
        }
    }

    /// Record the current thread as holder. Only the shard-lock owner calls
    /// this, so the store is race-free.
    #[inline]
    pub(crate) fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            self.holder.store(thread_token(), Ordering::Release);
            return ReentrancyGuard { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            ReentrancyGuard { _z: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub(crate) struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner.holder.store(0, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DebugReentrancy;

    #[test]
    fn check_enter_exit_is_ok() {
        let r = DebugReentrancy::new();
        r.check();
        let g = r.enter();
        drop(g);
        r.check();
    }

    #[cfg(debug_assertions)]
    #[test]
    fn same_thread_reentry_panics_in_debug() {
        let r = DebugReentrancy::new();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = r.enter();
            r.check();
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
    }

    /// Another thread must pass `check` while this thread is inside; it
    /// would block on the shard mutex rather than deadlock.
    #[cfg(debug_assertions)]
    #[test]
    fn other_thread_passes_check() {
        let r = DebugReentrancy::new();
        let _g = r.enter();
        std::thread::scope(|s| {
            s.spawn(|| r.check());
        });
    }
}
