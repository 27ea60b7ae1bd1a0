use crate::model::{BookingStatus, BookingWithRoom, RoomId};
use crate::store::{Store, StoreTx};
use crate::validate::validate_user_id;

use super::{Engine, EngineError};

impl<S: Store> Engine<S> {
    /// Bookings on a room, ascending by slot start (insertion order on
    /// ties), optionally filtered by status.
    pub async fn list_by_room(
        &self,
        room_id: RoomId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<BookingWithRoom>, EngineError> {
        let mut tx = self.store.begin().await?;
        let Some(room) = tx.room(room_id).await? else {
            tx.rollback().await?;
            return Err(EngineError::RoomNotFound(room_id));
        };
        let rows = tx.bookings_by_room(room_id, status).await?;
        tx.commit().await?;
        Ok(rows
            .into_iter()
            .map(|booking| BookingWithRoom {
                booking,
                room: room.clone(),
            })
            .collect())
    }

    /// A user's bookings across all rooms, ascending by slot start
    /// (insertion order on ties).
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<BookingWithRoom>, EngineError> {
        validate_user_id(user_id)?;

        let mut tx = self.store.begin().await?;
        let rows = tx.bookings_by_user(user_id).await?;
        let mut out = Vec::with_capacity(rows.len());
        for booking in rows {
            let room = tx
                .room(booking.room_id)
                .await?
                .ok_or(EngineError::RoomNotFound(booking.room_id))?;
            out.push(BookingWithRoom { booking, room });
        }
        tx.commit().await?;
        Ok(out)
    }
}
