use std::collections::HashSet;

use chrono::{NaiveDateTime, TimeDelta};
use ulid::Ulid;

use crate::limits::MAX_QUERY_WINDOW_MS;
use crate::model::*;
use crate::observability::AVAILABILITY_QUERIES_TOTAL;

use super::{Engine, EngineError};

/// Candidate tables not held by any active reservation in `busy`, ordered
/// by number.
pub fn free_tables(candidates: Vec<Table>, busy: &[Reservation]) -> Vec<Table> {
    let taken: HashSet<Ulid> = busy
        .iter()
        .filter(|r| r.is_active())
        .map(|r| r.table_id)
        .collect();
    let mut free: Vec<Table> = candidates
        .into_iter()
        .filter(|t| !taken.contains(&t.id))
        .collect();
    free.sort_by_key(|t| t.number);
    free
}

impl Engine {
    /// Tables seating at least `min_capacity` with no booked reservation
    /// overlapping `[start, start + duration)` local time.
    pub async fn available_tables(
        &self,
        start_local: NaiveDateTime,
        duration: TimeDelta,
        min_capacity: u32,
    ) -> Result<Vec<Table>, EngineError> {
        let window = self.local_span(start_local, duration)?;
        self.available_tables_in(window, min_capacity).await
    }

    /// As [`Engine::available_tables`], over a UTC window.
    pub async fn available_tables_in(
        &self,
        window: Span,
        min_capacity: u32,
    ) -> Result<Vec<Table>, EngineError> {
        if !window.is_valid() {
            return Err(EngineError::invalid("end must be after start"));
        }
        if window
            .duration_ms()
            .is_none_or(|ms| ms > MAX_QUERY_WINDOW_MS)
        {
            return Err(EngineError::invalid("query window too wide"));
        }
        metrics::counter!(AVAILABILITY_QUERIES_TOTAL).increment(1);

        let candidates = self
            .store
            .select_tables(|t| t.capacity >= min_capacity)
            .await;
        let busy = self
            .store
            .select_reservations(Some(window), Reservation::is_active)
            .await;
        Ok(free_tables(candidates, &busy))
    }
}
