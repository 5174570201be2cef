use std::io;

use ulid::Ulid;

/// Failures of the record store itself, independent of booking rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unique index on table number rejected the write.
    #[error("table number {0} is already in use")]
    DuplicateTableNumber(u32),

    #[error("table not found: {0}")]
    TableNotFound(Ulid),

    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),

    /// A transaction tried to touch a table it did not lock.
    #[error("table {0} is not locked by this transaction")]
    NotLocked(Ulid),

    #[error("WAL I/O error: {0}")]
    Io(String),

    /// An event could not be encoded for the WAL.
    #[error("WAL codec error: {0}")]
    Codec(String),

    #[error("WAL writer shut down")]
    WriterClosed,
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData => StoreError::Codec(e.to_string()),
            _ => StoreError::Io(e.to_string()),
        }
    }
}
