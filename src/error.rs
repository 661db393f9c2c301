//! Error surface of the store operations.

/// An error returned from a store or table operation.
///
/// Races (a key dying mid-operation, a lost install) are absorbed
/// internally and never reach callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A key tuple with zero elements was passed to a multi-key operation.
    #[error("key tuple must contain at least one key")]
    EmptyKeys,

    /// `add` was called for a key that is already present and alive.
    #[error("key is already present")]
    DuplicateKey,
}
