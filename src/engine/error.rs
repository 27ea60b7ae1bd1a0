use crate::model::{BookingId, RoomId};
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Instant string failed ISO-8601 parsing.
    InvalidFormat { field: &'static str },
    /// Instant off the 10-minute grid, or with non-zero (sub)seconds.
    InvalidGranularity { field: &'static str },
    NotFuture,
    InvalidOrder,
    InvalidUserId,
    RoomNotFound(RoomId),
    /// The requested interval intersects a CONFIRMED booking.
    SlotConflict { existing: BookingId },
    /// The store lost a serializable-isolation check to a concurrent
    /// transaction. The identical request may be resubmitted; the engine
    /// never retries on its own.
    RetryableConflict,
    /// No booking with this id owned by this user. Deliberately covers
    /// the wrong-owner case too, so existence never leaks to non-owners.
    NotFound(BookingId),
    AlreadyCancelled(BookingId),
    AlreadyStarted(BookingId),
    Store(String),
}

impl EngineError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::InvalidFormat { .. } => "invalid_format",
            EngineError::InvalidGranularity { .. } => "invalid_granularity",
            EngineError::NotFuture => "not_future",
            EngineError::InvalidOrder => "invalid_order",
            EngineError::InvalidUserId => "invalid_user_id",
            EngineError::RoomNotFound(_) => "room_not_found",
            EngineError::SlotConflict { .. } => "slot_conflict",
            EngineError::RetryableConflict => "retryable_conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyCancelled(_) => "already_cancelled",
            EngineError::AlreadyStarted(_) => "already_started",
            EngineError::Store(_) => "store",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidFormat { field } => {
                write!(f, "{field} is not a valid ISO-8601 instant")
            }
            EngineError::InvalidGranularity { field } => {
                write!(
                    f,
                    "{field} must align to 10-minute UTC boundaries with zero seconds"
                )
            }
            EngineError::NotFuture => write!(f, "start_time must be in the future"),
            EngineError::InvalidOrder => write!(f, "start_time must be before end_time"),
            EngineError::InvalidUserId => {
                write!(f, "user_id must contain only alphanumeric characters")
            }
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::SlotConflict { existing } => {
                write!(f, "slot conflicts with existing booking: {existing}")
            }
            EngineError::RetryableConflict => {
                write!(f, "concurrent transaction conflict; retry may succeed")
            }
            EngineError::NotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::AlreadyCancelled(id) => write!(f, "booking already cancelled: {id}"),
            EngineError::AlreadyStarted(id) => {
                write!(f, "booking {id} has already started or passed")
            }
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Serialization => EngineError::RetryableConflict,
            StoreError::Backend(msg) => EngineError::Store(msg),
        }
    }
}
