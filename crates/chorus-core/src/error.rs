//! Error types for the Chorus relay core.
//!
//! Pool operations never panic and never partially apply: every failure is
//! reported as a [`PoolError`] and leaves the pool exactly as it was.

use thiserror::Error;

/// Errors returned by [`ClientPool`](crate::ClientPool) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A pool must hold at least one slot (the listener).
    #[error("client pool capacity must be at least 1")]
    ZeroCapacity,

    /// Slot storage could not be allocated.
    #[error("failed to allocate {capacity} client slots")]
    Allocation {
        /// Requested number of slots
        capacity: usize,
    },

    /// Every slot is occupied.
    #[error("max clients ({capacity}) reached")]
    Full {
        /// Configured capacity of the pool
        capacity: usize,
    },

    /// The handle already occupies another slot.
    #[error("handle is already registered")]
    DuplicateHandle,

    /// No occupied slot holds the handle.
    #[error("handle not found in client pool")]
    NotFound,

    /// The pool has no occupied slots.
    #[error("no connected clients to remove")]
    Empty,
}

impl PoolError {
    /// Returns true if the failure came from a peer-level race (double remove,
    /// hang-up of an already reclaimed slot) rather than a misconfigured pool.
    ///
    /// Callers log these and keep serving.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full { .. } | Self::DuplicateHandle | Self::NotFound | Self::Empty)
    }
}
