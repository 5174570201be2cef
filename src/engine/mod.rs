//! Reservation rules on top of the record store: conflict detection, the
//! booking lifecycle and availability queries.

mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::free_tables;
pub use conflict::{find_conflict, has_conflict};
pub use error::{EngineError, ErrorKind};
pub use mutations::BookingRequest;

use std::sync::Arc;

use chrono::{FixedOffset, NaiveDateTime, TimeDelta, TimeZone};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::store::{Store, WriteTxn};

pub struct Engine {
    store: Arc<Store>,
    /// Offset used to read wall-clock inputs as UTC instants.
    utc_offset: FixedOffset,
}

impl Engine {
    pub fn new(store: Arc<Store>, utc_offset: FixedOffset) -> Self {
        Self { store, utc_offset }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    /// Interpret a local wall-clock time as a UTC instant.
    pub fn to_utc_ms(&self, local: NaiveDateTime) -> Result<Ms, EngineError> {
        self.utc_offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(|| EngineError::invalid(format!("unrepresentable local time {local}")))
    }

    /// `[start, start + duration)` in UTC. Rejects non-positive durations.
    pub(crate) fn local_span(
        &self,
        start_local: NaiveDateTime,
        duration: TimeDelta,
    ) -> Result<Span, EngineError> {
        let ms = duration.num_milliseconds();
        if ms <= 0 {
            return Err(EngineError::invalid("duration must be positive"));
        }
        let start = self.to_utc_ms(start_local)?;
        let end = start
            .checked_add(ms)
            .ok_or_else(|| EngineError::invalid("reservation end out of range"))?;
        Ok(Span { start, end })
    }

    /// Lock the table currently holding `id`, plus `also`, and return the
    /// stored reservation.
    ///
    /// A concurrent update may move the reservation between the index lookup
    /// and the lock; in that case the lookup is retried.
    pub(crate) async fn lock_reservation(
        &self,
        id: Ulid,
        also: Option<Ulid>,
    ) -> Result<(WriteTxn<'_>, Reservation), EngineError> {
        loop {
            let current = self
                .store
                .table_for_reservation(&id)
                .ok_or(EngineError::ReservationNotFound(id))?;
            let mut ids = vec![current];
            ids.extend(also);
            let txn = self.store.write(&ids).await?;

            let stored = txn.table(current).and_then(|s| s.reservation(id)).cloned();
            match stored {
                Some(r) => return Ok((txn, r)),
                None if self.store.table_for_reservation(&id) != Some(current) => continue,
                None => return Err(EngineError::ReservationNotFound(id)),
            }
        }
    }
}

pub(crate) fn validate_party_size(party_size: u32) -> Result<(), EngineError> {
    if party_size == 0 {
        return Err(EngineError::invalid("party size must be at least 1"));
    }
    Ok(())
}

pub(crate) fn validate_reservation_span(span: &Span) -> Result<(), EngineError> {
    if !span.is_valid() {
        return Err(EngineError::invalid("end must be after start"));
    }
    if span
        .duration_ms()
        .is_none_or(|ms| ms > MAX_RESERVATION_DURATION_MS)
    {
        return Err(EngineError::invalid("reservation longer than one day"));
    }
    Ok(())
}

pub(crate) fn validate_details(
    name: &str,
    phone: Option<&str>,
    notes: Option<&str>,
) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::invalid("name too long"));
    }
    if phone.is_some_and(|p| p.len() > MAX_PHONE_LEN) {
        return Err(EngineError::invalid("phone too long"));
    }
    if notes.is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(EngineError::invalid("notes too long"));
    }
    Ok(())
}
