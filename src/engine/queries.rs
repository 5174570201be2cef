use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Every reservation, of any status, intersecting the local day
    /// `[midnight, midnight + 24h)`. Ordered by start, then id.
    pub async fn list_for_day(&self, day: NaiveDate) -> Result<Vec<Reservation>, EngineError> {
        let start = self.to_utc_ms(day.and_time(NaiveTime::MIN))?;
        let window = Span::new(start, start + DAY_MS);
        Ok(self.store.select_reservations(Some(window), |_| true).await)
    }

    /// All tables, ordered by number.
    pub async fn tables(&self) -> Vec<Table> {
        self.store.select_tables(|_| true).await
    }

    pub async fn table(&self, id: Ulid) -> Result<Table, EngineError> {
        self.store
            .find_table(&id)
            .await
            .ok_or(EngineError::TableNotFound(id))
    }

    pub async fn table_by_number(&self, number: u32) -> Option<Table> {
        self.store.find_table_by_number(number).await
    }

    pub async fn reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store
            .find_reservation(&id)
            .await
            .ok_or(EngineError::ReservationNotFound(id))
    }

    /// Reservations on one table, of any status, ordered by start.
    pub async fn reservations_for_table(
        &self,
        table_id: Ulid,
    ) -> Result<Vec<Reservation>, EngineError> {
        let state = self
            .store
            .table_state(&table_id)
            .ok_or(EngineError::TableNotFound(table_id))?;
        let guard = state.read().await;
        Ok(guard.reservations.clone())
    }
}
