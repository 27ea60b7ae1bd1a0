pub mod engine;
pub mod locks;
pub mod model;
pub mod observability;
pub mod store;
pub mod validate;

pub use engine::{Engine, EngineError};
pub use model::{Booking, BookingId, BookingStatus, BookingWithRoom, Room, RoomId, Slot};
pub use store::memory::MemStore;
pub use store::{NewBooking, Store, StoreError, StoreTx};
