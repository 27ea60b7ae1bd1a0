use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Room identifier — externally assigned, stable for the room's lifetime.
pub type RoomId = i64;

/// Booking identifier — store-assigned, monotonically increasing.
pub type BookingId = i64;

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Slot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end, "Slot start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Half-open overlap test. Back-to-back slots (one's end equals the
    /// other's start) do not overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

/// A reservable room. Created and seeded externally; immutable here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
}

/// A single reservation of a room for a slot.
///
/// Created only as `Confirmed`; transitions at most once, to `Cancelled`,
/// and is never deleted or re-confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room_id: RoomId,
    /// Opaque owner identifier, ASCII alphanumeric.
    pub user_id: String,
    pub slot: Slot,
    pub status: BookingStatus,
    /// Set exactly once, when the booking is cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// A booking joined with the room it reserves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingWithRoom {
    pub booking: Booking,
    pub room: Room,
}
