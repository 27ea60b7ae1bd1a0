mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use crate::locks::LockRegistry;
use crate::store::Store;

/// Reservation engine: validation, per-room locking, and serializable
/// store transactions, so that no two CONFIRMED bookings on one room
/// ever overlap.
///
/// The lock registry is owned, not ambient: each engine instance
/// serializes its own create-attempts per room, and instances sharing a
/// store rely on the store's serializable isolation for cross-instance
/// races.
pub struct Engine<S: Store> {
    store: S,
    locks: LockRegistry,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: LockRegistry::new(),
        }
    }

    /// Handle to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }
}
