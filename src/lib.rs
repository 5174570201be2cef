pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod seed;
pub mod store;
pub mod wal;

pub use engine::{BookingRequest, Engine, EngineError, ErrorKind};
pub use model::{Record, Reservation, ReservationStatus, Span, Table};
pub use store::{Store, StoreError};
