use ulid::Ulid;

use crate::model::*;
use crate::observability::RESERVATION_CONFLICTS_TOTAL;

use super::{Engine, EngineError};

/// First active reservation on `state` overlapping `span`, skipping `exclude`.
///
/// Overlap is strict and half-open: `r.start < span.end && r.end > span.start`.
pub fn find_conflict<'a>(
    state: &'a TableState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Reservation> {
    state
        .overlapping(span)
        .filter(|r| r.is_active())
        .find(|r| Some(r.id) != exclude)
}

pub fn has_conflict(state: &TableState, span: &Span, exclude: Option<Ulid>) -> bool {
    find_conflict(state, span, exclude).is_some()
}

pub(crate) fn check_no_conflict(
    state: &TableState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(state, span, exclude) {
        Some(existing) => {
            metrics::counter!(RESERVATION_CONFLICTS_TOTAL).increment(1);
            Err(EngineError::Conflict {
                table_id: state.table.id,
                with: existing.id,
            })
        }
        None => Ok(()),
    }
}

pub(crate) fn check_capacity(party_size: u32, table: &Table) -> Result<(), EngineError> {
    if party_size > table.capacity {
        return Err(EngineError::CapacityExceeded {
            party_size,
            capacity: table.capacity,
        });
    }
    Ok(())
}

impl Engine {
    /// Whether any booked reservation on `table_id` overlaps `[start, end)`.
    ///
    /// The interval is assumed valid. An unknown table has no reservations.
    pub async fn has_conflict(
        &self,
        table_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> bool {
        let Some(state) = self.store.table_state(&table_id) else {
            return false;
        };
        let guard = state.read().await;
        has_conflict(&guard, &Span { start, end }, exclude)
    }
}
