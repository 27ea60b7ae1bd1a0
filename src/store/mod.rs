pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Booking, BookingId, BookingStatus, Room, RoomId, Slot};

/// Errors surfaced by a store backend.
#[derive(Debug)]
pub enum StoreError {
    /// A serializable-isolation conflict with a concurrent transaction,
    /// detected at commit time. Distinct from business-rule rejections;
    /// resubmitting the identical request may succeed.
    Serialization,
    /// Any other backend failure.
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Serialization => write!(f, "serialization conflict"),
            StoreError::Backend(e) => write!(f, "backend error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Fields of a booking to insert. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub room_id: RoomId,
    pub user_id: String,
    pub slot: Slot,
    pub status: BookingStatus,
}

/// Transactional store over Room and Booking rows.
///
/// Handles are cheap to clone and share underlying state, so several
/// engine instances can sit on one store — the multi-process layout where
/// the store's serializable isolation is the only cross-instance guard.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a transaction at serializable isolation.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// A single serializable transaction. Dropping a transaction without
/// committing aborts it.
#[async_trait]
pub trait StoreTx: Send {
    async fn room(&mut self, id: RoomId) -> Result<Option<Room>, StoreError>;

    /// First CONFIRMED booking on `room_id` whose half-open interval
    /// intersects `slot`, if any.
    async fn find_overlapping_confirmed(
        &mut self,
        room_id: RoomId,
        slot: &Slot,
    ) -> Result<Option<Booking>, StoreError>;

    async fn insert_booking(&mut self, new: NewBooking) -> Result<Booking, StoreError>;

    /// Joint lookup by id and owner; `None` for a wrong id or a wrong
    /// owner alike.
    async fn booking_by_id_and_user(
        &mut self,
        id: BookingId,
        user_id: &str,
    ) -> Result<Option<Booking>, StoreError>;

    async fn update_booking_status(
        &mut self,
        id: BookingId,
        status: BookingStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<Booking, StoreError>;

    /// Bookings on a room, optionally filtered by status, ascending by
    /// slot start with ties in insertion order.
    async fn bookings_by_room(
        &mut self,
        room_id: RoomId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// A user's bookings across all rooms, ascending by slot start with
    /// ties in insertion order.
    async fn bookings_by_user(&mut self, user_id: &str) -> Result<Vec<Booking>, StoreError>;

    /// Commit. `Err(StoreError::Serialization)` means a conflicting
    /// concurrent transaction won; nothing was applied.
    async fn commit(self) -> Result<(), StoreError>;

    /// Abort explicitly. Equivalent to dropping the transaction.
    async fn rollback(self) -> Result<(), StoreError>;
}
