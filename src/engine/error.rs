use ulid::Ulid;

use crate::store::StoreError;

/// Stable classification of every engine failure. Branch on this, never on
/// the rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    Store,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("party of {party_size} exceeds table capacity ({capacity})")]
    CapacityExceeded { party_size: u32, capacity: u32 },

    #[error("table not found: {0}")]
    TableNotFound(Ulid),

    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),

    #[error("time slot already booked on table {table_id} (held by reservation {with})")]
    Conflict { table_id: Ulid, with: Ulid },

    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidArgument(_) | EngineError::CapacityExceeded { .. } => {
                ErrorKind::InvalidArgument
            }
            EngineError::TableNotFound(_) | EngineError::ReservationNotFound(_) => {
                ErrorKind::NotFound
            }
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::Store(_) => ErrorKind::Store,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidArgument(msg.into())
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::TableNotFound(id) => EngineError::TableNotFound(id),
            StoreError::ReservationNotFound(id) => EngineError::ReservationNotFound(id),
            StoreError::DuplicateTableNumber(n) => {
                EngineError::InvalidArgument(format!("table number {n} is already in use"))
            }
            other => EngineError::Store(other),
        }
    }
}
