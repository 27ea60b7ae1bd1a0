use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::model::{BookingId, BookingStatus, BookingWithRoom, RoomId};
use crate::observability;
use crate::store::{NewBooking, Store, StoreTx};
use crate::validate::{validate_slot, validate_user_id};

use super::{Engine, EngineError};

impl<S: Store> Engine<S> {
    /// Create a CONFIRMED booking for `[start, end)` on `room_id`.
    ///
    /// Create-attempts for one room are serialized by the per-room lock;
    /// the overlap re-check runs inside a serializable transaction as the
    /// safety net against other engine instances on the same store. A
    /// serialization failure at commit surfaces as `RetryableConflict`
    /// and is never retried internally.
    pub async fn reserve(
        &self,
        room_id: RoomId,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<BookingWithRoom, EngineError> {
        let started = Instant::now();
        let result = self.try_reserve(room_id, user_id, start, end).await;
        metrics::histogram!(observability::RESERVE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            observability::RESERVATIONS_TOTAL,
            "outcome" => observability::outcome_label(&result)
        )
        .increment(1);
        result
    }

    async fn try_reserve(
        &self,
        room_id: RoomId,
        user_id: &str,
        start: &str,
        end: &str,
    ) -> Result<BookingWithRoom, EngineError> {
        validate_user_id(user_id)?;
        let slot = validate_slot(start, end, Utc::now())?;

        // Exclusive per-room section. The guard drops on every exit path
        // below, so the lock is always released before an error returns.
        let lock_wait = Instant::now();
        let _room_lock = self.locks.acquire(room_id).await;
        metrics::histogram!(observability::LOCK_WAIT_SECONDS)
            .record(lock_wait.elapsed().as_secs_f64());

        let mut tx = self.store.begin().await?;
        let Some(room) = tx.room(room_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::RoomNotFound(room_id));
        };
        if let Some(existing) = tx.find_overlapping_confirmed(room_id, &slot).await? {
            tx.rollback().await?;
            debug!(room_id, existing = existing.id, "reservation conflict");
            return Err(EngineError::SlotConflict {
                existing: existing.id,
            });
        }
        let booking = tx
            .insert_booking(NewBooking {
                room_id,
                user_id: user_id.to_owned(),
                slot,
                status: BookingStatus::Confirmed,
            })
            .await?;
        // Commit-time serialization failures map to RetryableConflict
        // through the StoreError conversion.
        tx.commit().await?;

        info!(booking = booking.id, room_id, user_id, "booking confirmed");
        Ok(BookingWithRoom { booking, room })
    }

    /// Transition a booking CONFIRMED → CANCELLED.
    ///
    /// Runs in a single transaction and takes no room lock: it only
    /// touches the one row addressed by `(id, user_id)` and cannot itself
    /// create an overlap. A concurrent `reserve` on the same room is
    /// ordered by the store's serializable isolation.
    pub async fn cancel(
        &self,
        booking_id: BookingId,
        user_id: &str,
    ) -> Result<BookingWithRoom, EngineError> {
        let result = self.try_cancel(booking_id, user_id).await;
        metrics::counter!(
            observability::CANCELLATIONS_TOTAL,
            "outcome" => observability::outcome_label(&result)
        )
        .increment(1);
        result
    }

    async fn try_cancel(
        &self,
        booking_id: BookingId,
        user_id: &str,
    ) -> Result<BookingWithRoom, EngineError> {
        validate_user_id(user_id)?;

        let mut tx = self.store.begin().await?;
        // Joint lookup: a wrong owner reads the same as a missing id.
        let Some(booking) = tx.booking_by_id_and_user(booking_id, user_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::NotFound(booking_id));
        };
        if booking.status == BookingStatus::Cancelled {
            tx.rollback().await?;
            return Err(EngineError::AlreadyCancelled(booking_id));
        }
        let now = Utc::now();
        if booking.slot.start <= now {
            tx.rollback().await?;
            return Err(EngineError::AlreadyStarted(booking_id));
        }
        let updated = tx
            .update_booking_status(booking_id, BookingStatus::Cancelled, Some(now))
            .await?;
        let room = tx
            .room(updated.room_id)
            .await?
            .ok_or(EngineError::RoomNotFound(updated.room_id))?;
        tx.commit().await?;

        info!(booking = booking_id, user_id, "booking cancelled");
        Ok(BookingWithRoom {
            booking: updated,
            room,
        })
    }
}
