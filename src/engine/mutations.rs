use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{
    RESERVATIONS_CANCELED_TOTAL, RESERVATIONS_CREATED_TOTAL, RESERVATIONS_UPDATED_TOTAL,
    record_rejection,
};

use super::conflict::{check_capacity, check_no_conflict};
use super::{
    Engine, EngineError, validate_details, validate_party_size, validate_reservation_span,
};

/// Input to [`Engine::create_reservation`]. Times are local wall-clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub table_id: Ulid,
    pub name: String,
    pub start_local: NaiveDateTime,
    pub duration: TimeDelta,
    pub party_size: u32,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl BookingRequest {
    pub fn new(
        table_id: Ulid,
        name: impl Into<String>,
        start_local: NaiveDateTime,
        duration: TimeDelta,
        party_size: u32,
    ) -> Self {
        Self {
            table_id,
            name: name.into(),
            start_local,
            duration,
            party_size,
            phone: None,
            notes: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl Engine {
    /// Book a table. Arguments are validated before the table is looked up;
    /// the capacity and conflict checks run under the table's write lock.
    pub async fn create_reservation(
        &self,
        req: BookingRequest,
    ) -> Result<Reservation, EngineError> {
        self.try_create(req).await.inspect_err(|e| record_rejection("create", e.kind()))
    }

    async fn try_create(&self, req: BookingRequest) -> Result<Reservation, EngineError> {
        let span = self.local_span(req.start_local, req.duration)?;
        validate_reservation_span(&span)?;
        validate_party_size(req.party_size)?;
        validate_details(&req.name, req.phone.as_deref(), req.notes.as_deref())?;

        let mut txn = self.store.write(&[req.table_id]).await?;
        let state = txn
            .table(req.table_id)
            .ok_or(EngineError::TableNotFound(req.table_id))?;
        check_capacity(req.party_size, &state.table)?;
        check_no_conflict(state, &span, None)?;

        let reservation = txn
            .insert_reservation(NewReservation {
                table_id: req.table_id,
                name: req.name,
                party_size: req.party_size,
                span,
                status: ReservationStatus::Booked,
                phone: req.phone,
                notes: req.notes,
            })
            .await?;
        drop(txn);

        metrics::counter!(RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            reservation = %reservation.id,
            table = %reservation.table_id,
            start = reservation.span.start,
            end = reservation.span.end,
            party = reservation.party_size,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Overwrite a reservation's time, table, party or contact details.
    ///
    /// With `check_conflicts` false the capacity and overlap checks are
    /// skipped entirely; the caller takes responsibility for the result.
    /// Status is never changed here: use [`Engine::cancel_reservation`].
    pub async fn update_reservation(
        &self,
        reservation: Reservation,
        check_conflicts: bool,
    ) -> Result<Reservation, EngineError> {
        self.try_update(reservation, check_conflicts)
            .await
            .inspect_err(|e| record_rejection("update", e.kind()))
    }

    async fn try_update(
        &self,
        reservation: Reservation,
        check_conflicts: bool,
    ) -> Result<Reservation, EngineError> {
        validate_reservation_span(&reservation.span)?;
        validate_party_size(reservation.party_size)?;
        validate_details(
            &reservation.name,
            reservation.phone.as_deref(),
            reservation.notes.as_deref(),
        )?;

        let (mut txn, stored) = self
            .lock_reservation(reservation.id, Some(reservation.table_id))
            .await?;
        if stored.status == ReservationStatus::Canceled {
            return Err(EngineError::invalid(format!(
                "reservation {} is canceled",
                stored.id
            )));
        }

        let target = txn
            .table(reservation.table_id)
            .ok_or(EngineError::TableNotFound(reservation.table_id))?;
        if check_conflicts {
            if stored.table_id != reservation.table_id
                || stored.party_size != reservation.party_size
            {
                check_capacity(reservation.party_size, &target.table)?;
            }
            check_no_conflict(target, &reservation.span, Some(reservation.id))?;
        }

        let updated = Reservation {
            status: stored.status,
            ..reservation
        };
        if txn.update_reservation(&updated).await? == 0 {
            return Err(EngineError::ReservationNotFound(updated.id));
        }
        drop(txn);

        metrics::counter!(RESERVATIONS_UPDATED_TOTAL).increment(1);
        info!(
            reservation = %updated.id,
            table = %updated.table_id,
            moved = stored.table_id != updated.table_id,
            start = updated.span.start,
            end = updated.span.end,
            checked = check_conflicts,
            "reservation updated"
        );
        Ok(updated)
    }

    /// Move a reservation to canceled, freeing its slot.
    ///
    /// Returns the number of reservations changed: 1, or 0 when it was
    /// already canceled.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<u64, EngineError> {
        self.try_cancel(id)
            .await
            .inspect_err(|e| record_rejection("cancel", e.kind()))
    }

    async fn try_cancel(&self, id: Ulid) -> Result<u64, EngineError> {
        let (mut txn, stored) = self.lock_reservation(id, None).await?;
        if stored.status == ReservationStatus::Canceled {
            debug!(reservation = %id, "cancel: already canceled");
            return Ok(0);
        }
        let canceled = Reservation {
            status: ReservationStatus::Canceled,
            ..stored
        };
        let affected = txn.update_reservation(&canceled).await?;
        drop(txn);

        metrics::counter!(RESERVATIONS_CANCELED_TOTAL).increment(affected);
        info!(reservation = %id, table = %canceled.table_id, "reservation canceled");
        Ok(affected)
    }

    // ── Tables ───────────────────────────────────────────────

    pub async fn add_table(&self, number: u32, capacity: u32) -> Result<Table, EngineError> {
        validate_capacity(capacity)?;
        if self.store.table_count() >= MAX_TABLES {
            return Err(EngineError::invalid("too many tables"));
        }
        let table = self.store.insert_table(number, capacity).await?;
        info!(table = %table.id, number, capacity, "table added");
        Ok(table)
    }

    /// Change a table's seat count. Existing reservations are kept even if
    /// they no longer fit.
    pub async fn set_table_capacity(&self, id: Ulid, capacity: u32) -> Result<Table, EngineError> {
        validate_capacity(capacity)?;
        let table = self
            .store
            .find_table(&id)
            .await
            .ok_or(EngineError::TableNotFound(id))?;
        let updated = Table { capacity, ..table };
        if self.store.update_table(&updated).await? == 0 {
            return Err(EngineError::TableNotFound(id));
        }
        info!(table = %id, number = updated.number, capacity, "table capacity changed");
        Ok(updated)
    }
}

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity == 0 || capacity > MAX_TABLE_CAPACITY {
        return Err(EngineError::invalid(format!(
            "capacity must be between 1 and {MAX_TABLE_CAPACITY}"
        )));
    }
    Ok(())
}
