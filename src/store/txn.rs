use tokio::sync::{OwnedRwLockWriteGuard, RwLockReadGuard};
use ulid::Ulid;

use crate::model::*;

use super::{Store, StoreError};

/// Exclusive access to a fixed set of tables.
///
/// Everything read through the transaction stays valid until it is dropped,
/// so a conflict check followed by an insert cannot race another writer on
/// the same table. Writes are durable before they are applied.
pub struct WriteTxn<'a> {
    store: &'a Store,
    _gate: RwLockReadGuard<'a, ()>,
    guards: Vec<OwnedRwLockWriteGuard<TableState>>,
}

impl<'a> WriteTxn<'a> {
    pub(super) fn new(
        store: &'a Store,
        gate: RwLockReadGuard<'a, ()>,
        guards: Vec<OwnedRwLockWriteGuard<TableState>>,
    ) -> Self {
        Self {
            store,
            _gate: gate,
            guards,
        }
    }

    /// A locked table's current state.
    pub fn table(&self, id: Ulid) -> Option<&TableState> {
        self.guards.iter().map(|g| &**g).find(|s| s.table.id == id)
    }

    fn table_mut(&mut self, id: Ulid) -> Result<&mut TableState, StoreError> {
        self.guards
            .iter_mut()
            .map(|g| &mut **g)
            .find(|s| s.table.id == id)
            .ok_or(StoreError::NotLocked(id))
    }

    fn ensure_locked(&self, id: Ulid) -> Result<(), StoreError> {
        match self.table(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotLocked(id)),
        }
    }

    /// Insert a reservation on a locked table, assigning its id.
    pub async fn insert_reservation(
        &mut self,
        new: NewReservation,
    ) -> Result<Reservation, StoreError> {
        self.ensure_locked(new.table_id)?;
        let reservation = new.with_id(Ulid::new());
        self.store
            .append(Event::ReservationCreated {
                reservation: reservation.clone(),
            })
            .await?;

        self.store
            .reservation_tables
            .insert(reservation.id, reservation.table_id);
        self.table_mut(reservation.table_id)?
            .insert_reservation(reservation.clone());
        Ok(reservation)
    }

    /// Overwrite a reservation by id, moving it between tables if its
    /// `table_id` changed. Both tables must be locked.
    ///
    /// Returns the number of rows affected: 0 when no such reservation exists.
    pub async fn update_reservation(&mut self, reservation: &Reservation) -> Result<u64, StoreError> {
        let Some(previous_table_id) = self.store.table_for_reservation(&reservation.id) else {
            return Ok(0);
        };
        self.ensure_locked(previous_table_id)?;
        self.ensure_locked(reservation.table_id)?;
        if self
            .table(previous_table_id)
            .and_then(|s| s.reservation(reservation.id))
            .is_none()
        {
            return Ok(0);
        }

        self.store
            .append(Event::ReservationUpdated {
                previous_table_id,
                reservation: reservation.clone(),
            })
            .await?;

        self.table_mut(previous_table_id)?
            .remove_reservation(reservation.id);
        self.table_mut(reservation.table_id)?
            .insert_reservation(reservation.clone());
        self.store
            .reservation_tables
            .insert(reservation.id, reservation.table_id);
        Ok(1)
    }
}
