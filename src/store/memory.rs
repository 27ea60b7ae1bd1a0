//! In-memory store with serializable commit semantics.
//!
//! Transactions read from a snapshot taken at `begin` and buffer their
//! writes. Commit validates, first-committer-wins, that nothing the
//! transaction read — row reads and per-room / per-user predicate reads —
//! was changed by a transaction that committed after the snapshot, and
//! surfaces `StoreError::Serialization` otherwise. Un-serialized
//! concurrent writers therefore race exactly the way two engine
//! instances sharing one database would.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{Booking, BookingId, BookingStatus, Room, RoomId, Slot};

use super::{NewBooking, Store, StoreError, StoreTx};

#[derive(Debug, Default, Clone)]
struct State {
    rooms: BTreeMap<RoomId, Room>,
    bookings: BTreeMap<BookingId, Booking>,
    /// Bumped once per committed writing transaction.
    commit_seq: u64,
    /// Last commit that wrote each booking row.
    row_stamp: HashMap<BookingId, u64>,
    /// Last commit that changed each room's booking set.
    room_stamp: HashMap<RoomId, u64>,
    /// Last commit that changed each user's booking set.
    user_stamp: HashMap<String, u64>,
}

struct Inner {
    state: Mutex<State>,
    next_booking_id: AtomicI64,
}

/// Shared-handle in-memory store. Clones share the same state.
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<Inner>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                next_booking_id: AtomicI64::new(1),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().expect("store state poisoned")
    }

    /// Seed a room. Rooms are created outside the transactional API; the
    /// engine treats them as pre-existing and immutable.
    pub fn insert_room(&self, room: Room) {
        self.state().rooms.insert(room.id, room);
    }

    pub fn booking_count(&self) -> usize {
        self.state().bookings.len()
    }

    /// All booking rows in id (insertion) order. Diagnostic accessor.
    pub fn dump_bookings(&self) -> Vec<Booking> {
        self.state().bookings.values().cloned().collect()
    }
}

enum Write {
    Insert(Booking),
    SetStatus {
        id: BookingId,
        status: BookingStatus,
        cancelled_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    },
}

pub struct MemTx {
    store: MemStore,
    base_seq: u64,
    snapshot: State,
    read_rows: HashSet<BookingId>,
    read_rooms: HashSet<RoomId>,
    read_users: HashSet<String>,
    writes: Vec<Write>,
}

impl MemTx {
    fn sorted(mut rows: Vec<Booking>) -> Vec<Booking> {
        rows.sort_by_key(|b| (b.slot.start, b.id));
        rows
    }
}

#[async_trait]
impl Store for MemStore {
    type Tx = MemTx;

    async fn begin(&self) -> Result<MemTx, StoreError> {
        let snapshot = self.state().clone();
        Ok(MemTx {
            store: self.clone(),
            base_seq: snapshot.commit_seq,
            snapshot,
            read_rows: HashSet::new(),
            read_rooms: HashSet::new(),
            read_users: HashSet::new(),
            writes: Vec::new(),
        })
    }
}

#[async_trait]
impl StoreTx for MemTx {
    async fn room(&mut self, id: RoomId) -> Result<Option<Room>, StoreError> {
        // Rooms are immutable, so room reads need no conflict tracking.
        Ok(self.snapshot.rooms.get(&id).cloned())
    }

    async fn find_overlapping_confirmed(
        &mut self,
        room_id: RoomId,
        slot: &Slot,
    ) -> Result<Option<Booking>, StoreError> {
        self.read_rooms.insert(room_id);
        Ok(self
            .snapshot
            .bookings
            .values()
            .find(|b| b.room_id == room_id && b.is_confirmed() && b.slot.overlaps(slot))
            .cloned())
    }

    async fn insert_booking(&mut self, new: NewBooking) -> Result<Booking, StoreError> {
        let now = Utc::now();
        // Ids come from a shared sequence: unique across concurrent
        // transactions, burned on abort.
        let id = self.store.inner.next_booking_id.fetch_add(1, Ordering::Relaxed);
        let booking = Booking {
            id,
            room_id: new.room_id,
            user_id: new.user_id,
            slot: new.slot,
            status: new.status,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        // Read-your-writes: later statements in this transaction see it.
        self.snapshot.bookings.insert(id, booking.clone());
        self.writes.push(Write::Insert(booking.clone()));
        Ok(booking)
    }

    async fn booking_by_id_and_user(
        &mut self,
        id: BookingId,
        user_id: &str,
    ) -> Result<Option<Booking>, StoreError> {
        self.read_rows.insert(id);
        Ok(self
            .snapshot
            .bookings
            .get(&id)
            .filter(|b| b.user_id == user_id)
            .cloned())
    }

    async fn update_booking_status(
        &mut self,
        id: BookingId,
        status: BookingStatus,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<Booking, StoreError> {
        self.read_rows.insert(id);
        let now = Utc::now();
        let Some(b) = self.snapshot.bookings.get_mut(&id) else {
            return Err(StoreError::Backend(format!("booking {id} does not exist")));
        };
        b.status = status;
        b.cancelled_at = cancelled_at;
        b.updated_at = now;
        let updated = b.clone();
        self.writes.push(Write::SetStatus {
            id,
            status,
            cancelled_at,
            updated_at: now,
        });
        Ok(updated)
    }

    async fn bookings_by_room(
        &mut self,
        room_id: RoomId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>, StoreError> {
        self.read_rooms.insert(room_id);
        let rows = self
            .snapshot
            .bookings
            .values()
            .filter(|b| b.room_id == room_id && status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        Ok(Self::sorted(rows))
    }

    async fn bookings_by_user(&mut self, user_id: &str) -> Result<Vec<Booking>, StoreError> {
        self.read_users.insert(user_id.to_owned());
        let rows = self
            .snapshot
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted(rows))
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut guard = self.store.state();
        let state = &mut *guard;

        if state.commit_seq != self.base_seq {
            // Someone committed since our snapshot — first committer wins
            // on everything we read.
            let stale_row = self
                .read_rows
                .iter()
                .any(|id| state.row_stamp.get(id).copied().unwrap_or(0) > self.base_seq);
            let stale_room = self
                .read_rooms
                .iter()
                .any(|id| state.room_stamp.get(id).copied().unwrap_or(0) > self.base_seq);
            let stale_user = self
                .read_users
                .iter()
                .any(|u| state.user_stamp.get(u).copied().unwrap_or(0) > self.base_seq);
            if stale_row || stale_room || stale_user {
                return Err(StoreError::Serialization);
            }
        }

        if self.writes.is_empty() {
            return Ok(());
        }

        state.commit_seq += 1;
        let seq = state.commit_seq;
        for write in self.writes {
            match write {
                Write::Insert(b) => {
                    state.row_stamp.insert(b.id, seq);
                    state.room_stamp.insert(b.room_id, seq);
                    state.user_stamp.insert(b.user_id.clone(), seq);
                    state.bookings.insert(b.id, b);
                }
                Write::SetStatus {
                    id,
                    status,
                    cancelled_at,
                    updated_at,
                } => {
                    let Some(b) = state.bookings.get_mut(&id) else {
                        return Err(StoreError::Backend(format!(
                            "booking {id} vanished before commit"
                        )));
                    };
                    b.status = status;
                    b.cancelled_at = cancelled_at;
                    b.updated_at = updated_at;
                    let (room_id, user_id) = (b.room_id, b.user_id.clone());
                    state.row_stamp.insert(id, seq);
                    state.room_stamp.insert(room_id, seq);
                    state.user_stamp.insert(user_id, seq);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        // Writes were only buffered; dropping them is the abort.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn slot(day: u32, h: u32, m: u32, minutes: i64) -> Slot {
        let start = Utc.with_ymd_and_hms(2031, 3, day, h, m, 0).unwrap();
        Slot::new(start, start + Duration::minutes(minutes))
    }

    fn seeded() -> MemStore {
        let store = MemStore::new();
        store.insert_room(Room {
            id: 1,
            name: "Room 1".into(),
        });
        store.insert_room(Room {
            id: 2,
            name: "Room 2".into(),
        });
        store
    }

    fn confirmed(room_id: RoomId, user: &str, slot: Slot) -> NewBooking {
        NewBooking {
            room_id,
            user_id: user.into(),
            slot,
            status: BookingStatus::Confirmed,
        }
    }

    #[tokio::test]
    async fn committed_insert_is_visible() {
        let store = seeded();
        let mut tx = store.begin().await.unwrap();
        let booking = tx
            .insert_booking(confirmed(1, "alice", slot(1, 10, 0, 60)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let found = tx
            .booking_by_id_and_user(booking.id, "alice")
            .await
            .unwrap();
        assert_eq!(found, Some(booking));
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = seeded();
        let mut tx = store.begin().await.unwrap();
        tx.insert_booking(confirmed(1, "alice", slot(1, 10, 0, 60)))
            .await
            .unwrap();
        drop(tx);
        assert_eq!(store.booking_count(), 0);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = seeded();
        let mut tx = store.begin().await.unwrap();
        tx.insert_booking(confirmed(1, "alice", slot(1, 10, 0, 60)))
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.booking_count(), 0);
    }

    #[tokio::test]
    async fn read_your_writes_within_transaction() {
        let store = seeded();
        let mut tx = store.begin().await.unwrap();
        let s = slot(1, 10, 0, 60);
        tx.insert_booking(confirmed(1, "alice", s)).await.unwrap();
        let found = tx.find_overlapping_confirmed(1, &s).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn first_committer_wins_on_room_predicate() {
        let store = seeded();
        let s = slot(1, 10, 0, 60);

        // Two un-serialized writers both check the room and insert.
        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        assert!(tx1.find_overlapping_confirmed(1, &s).await.unwrap().is_none());
        assert!(tx2.find_overlapping_confirmed(1, &s).await.unwrap().is_none());
        tx1.insert_booking(confirmed(1, "alice", s)).await.unwrap();
        tx2.insert_booking(confirmed(1, "bob", s)).await.unwrap();

        tx1.commit().await.unwrap();
        let lost = tx2.commit().await;
        assert!(matches!(lost, Err(StoreError::Serialization)));
        assert_eq!(store.booking_count(), 1);
    }

    #[tokio::test]
    async fn row_readers_conflict_with_committed_writer() {
        let store = seeded();
        let mut tx = store.begin().await.unwrap();
        let booking = tx
            .insert_booking(confirmed(1, "alice", slot(1, 10, 0, 60)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // Both transactions read then update the same row.
        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        let now = Utc::now();
        tx1.booking_by_id_and_user(booking.id, "alice").await.unwrap();
        tx2.booking_by_id_and_user(booking.id, "alice").await.unwrap();
        tx1.update_booking_status(booking.id, BookingStatus::Cancelled, Some(now))
            .await
            .unwrap();
        tx2.update_booking_status(booking.id, BookingStatus::Cancelled, Some(now))
            .await
            .unwrap();

        tx1.commit().await.unwrap();
        let lost = tx2.commit().await;
        assert!(matches!(lost, Err(StoreError::Serialization)));
    }

    #[tokio::test]
    async fn writers_on_different_rooms_do_not_conflict() {
        let store = seeded();
        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        let s = slot(1, 10, 0, 60);
        assert!(tx1.find_overlapping_confirmed(1, &s).await.unwrap().is_none());
        assert!(tx2.find_overlapping_confirmed(2, &s).await.unwrap().is_none());
        tx1.insert_booking(confirmed(1, "alice", s)).await.unwrap();
        tx2.insert_booking(confirmed(2, "bob", s)).await.unwrap();

        tx1.commit().await.unwrap();
        tx2.commit().await.unwrap();
        assert_eq!(store.booking_count(), 2);
    }

    #[tokio::test]
    async fn listings_sort_by_start_with_insertion_order_ties() {
        let store = seeded();
        let mut tx = store.begin().await.unwrap();
        let late = tx
            .insert_booking(confirmed(1, "alice", slot(1, 12, 0, 60)))
            .await
            .unwrap();
        let early = tx
            .insert_booking(confirmed(1, "alice", slot(1, 9, 0, 60)))
            .await
            .unwrap();
        // Same start as `late`, inserted afterwards, then cancelled.
        let tied = tx
            .insert_booking(confirmed(1, "alice", slot(1, 12, 0, 30)))
            .await
            .unwrap();
        tx.update_booking_status(tied.id, BookingStatus::Cancelled, Some(Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let rows = tx.bookings_by_room(1, None).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![early.id, late.id, tied.id]);

        let only_confirmed = tx
            .bookings_by_room(1, Some(BookingStatus::Confirmed))
            .await
            .unwrap();
        assert_eq!(only_confirmed.len(), 2);

        let by_user = tx.bookings_by_user("alice").await.unwrap();
        assert_eq!(by_user.len(), 3);
        assert!(by_user.windows(2).all(|w| w[0].slot.start <= w[1].slot.start));
    }
}
