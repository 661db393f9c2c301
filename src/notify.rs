//! At-most-once disposal notifiers.
//!
//! A `Notifier` is owned by exactly one entry slot and subscribed to every
//! key of that slot. Whichever key dies first fires it; every later fire
//! (or an explicit disarm during removal) is a no-op.

use core::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;

type Action = Box<dyn FnOnce() + Send>;

/// One-shot trigger that runs its action when a watched key becomes
/// unreachable.
///
/// `fire` may be called from any thread, any number of times, by any number
/// of key watchers; the action runs at most once. An entry that is removed
/// explicitly disarms its notifier so a later key death stays silent.
pub struct Notifier {
    armed: AtomicBool,
    action: Mutex<Option<Action>>,
}

impl Notifier {
    pub(crate) fn new(action: Action) -> Self {
        Self {
            armed: AtomicBool::new(true),
            action: Mutex::new(Some(action)),
        }
    }

    /// Run the action if it has not run and has not been disarmed.
    ///
    /// Custom [`WeakKey`](crate::WeakKey) implementations call this from
    /// their unreachability hook.
    pub fn fire(&self) {
        if self.armed.swap(false, Ordering::AcqRel) {
            if let Some(action) = self.action.lock().take() {
                action();
            }
        }
    }

    /// Suppress any pending fire and drop the action.
    pub(crate) fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
        let _ = self.action.lock().take();
    }
}

impl core::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier")
            .field("armed", &self.armed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Invariant: the action runs on the first fire only, no matter how many
    /// watchers race to deliver it.
    #[test]
    fn fires_at_most_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let n = {
            let hits = hits.clone();
            Notifier::new(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
        };
        n.fire();
        n.fire();
        n.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    /// Invariant: a disarmed notifier never runs its action.
    #[test]
    fn disarm_suppresses_fire() {
        let hits = Arc::new(AtomicUsize::new(0));
        let n = {
            let hits = hits.clone();
            Notifier::new(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
        };
        n.disarm();
        n.fire();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    /// Invariant: concurrent fires from many threads still run the action once.
    #[test]
    fn concurrent_fire_runs_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let n = Arc::new({
            let hits = hits.clone();
            Notifier::new(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
        });
        std::thread::scope(|s| {
            for _ in 0..8 {
                let n = n.clone();
                s.spawn(move || n.fire());
            }
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
