//! weak-store: maps whose entries live only as long as their keys do.
//!
//! Two containers share one engine:
//!
//! - [`MultiKeyWeakStore`] keys each value by an ordered tuple of
//!   identity-compared keys; the entry survives while *every* key is still
//!   alive somewhere outside the store.
//! - [`WeakTable`] keys each value by a single key under the referent's
//!   `Eq`/`Hash`, so equal-but-distinct key instances and borrowed forms
//!   (`&str` for `Weak<String>`) address the same entry.
//!
//! Neither container keeps a key alive. When a key dies, its entry stops
//! matching lookups at once; the index slot is then unlinked and the value
//! handed to the store's [`Lifecycle::release`] hook exactly once: on the
//! dropping thread for [`Observed`] keys, otherwise during amortized sweeps
//! or an explicit `purge`.
//!
//! ```
//! use std::sync::{Arc, Weak};
//! use weak_store::WeakTable;
//!
//! let table: WeakTable<Weak<String>, u32> = WeakTable::new();
//! let key = Arc::new("session".to_string());
//! table.insert(&key, 41);
//! assert_eq!(table.get("session"), Some(41));
//!
//! drop(key);
//! assert_eq!(table.get("session"), None);
//! table.purge();
//! assert!(table.is_empty());
//! ```

mod error;
mod index;
mod key;
mod lifecycle;
mod multi;
mod notify;
mod reentrancy;
mod slot;
mod store;
mod table;

pub mod handle;

pub use error::StoreError;
pub use handle::{Observed, WeakKey, WeakObserved};
pub use lifecycle::{ArcIdentity, DefaultLifecycle, Lifecycle};
pub use multi::MultiKeyWeakStore;
pub use notify::Notifier;
pub use table::{Iter, Keys, Values, WeakTable};
