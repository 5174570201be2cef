//! Embedded record store: tables and reservations held in memory, made
//! durable by an append-only WAL.
//!
//! Every mutation is appended to the WAL (and fsynced by the writer task)
//! before it becomes visible in memory. Reservation writes go through a
//! [`WriteTxn`], which holds the write locks of every table it touches for
//! the whole read-check-write sequence.

mod error;
mod txn;
mod writer;

pub use error::StoreError;
pub use txn::WriteTxn;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::wal::Wal;

use writer::{WalCommand, run_writer};

pub type SharedTableState = Arc<RwLock<TableState>>;

pub struct Store {
    tables: DashMap<Ulid, SharedTableState>,
    /// Unique index: table number → table id.
    numbers: DashMap<u32, Ulid>,
    /// Reverse lookup: reservation id → table id.
    reservation_tables: DashMap<Ulid, Ulid>,
    /// Writers hold it shared; compaction holds it exclusively so the
    /// snapshot it writes cannot miss a concurrent append.
    gate: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
    path: PathBuf,
    /// Events read back from the WAL when the store was opened.
    replayed: usize,
}

impl Store {
    /// Open (or create) the store at `path`, replaying its WAL.
    ///
    /// Spawns the WAL writer, so this must run inside a Tokio runtime.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let (wal, events) = Wal::open(&path)?;
        let replayed = events.len();

        let mut states: HashMap<Ulid, TableState> = HashMap::new();
        let reservation_tables = DashMap::new();
        for event in events {
            replay_event(&mut states, &reservation_tables, event);
        }

        let numbers = DashMap::new();
        let tables = DashMap::new();
        for (id, state) in states {
            numbers.insert(state.table.number, id);
            tables.insert(id, Arc::new(RwLock::new(state)));
        }

        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(run_writer(wal, wal_rx));

        info!(
            path = %path.display(),
            events = replayed,
            tables = tables.len(),
            reservations = reservation_tables.len(),
            "store opened"
        );
        Ok(Self {
            tables,
            numbers,
            reservation_tables,
            gate: RwLock::new(()),
            wal_tx,
            path,
            replayed,
        })
    }

    /// Delete any existing data file, then open an empty store.
    pub fn open_fresh(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "removed existing store file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn replayed_events(&self) -> usize {
        self.replayed
    }

    /// Send one event to the WAL writer and wait until it is durable.
    /// Callers hold `gate` shared.
    async fn append(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)??;
        Ok(())
    }

    pub(crate) fn table_state(&self, id: &Ulid) -> Option<SharedTableState> {
        self.tables.get(id).map(|e| e.value().clone())
    }

    fn all_table_states(&self) -> Vec<SharedTableState> {
        self.tables.iter().map(|e| e.value().clone()).collect()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_tables.len()
    }

    pub fn table_for_reservation(&self, id: &Ulid) -> Option<Ulid> {
        self.reservation_tables.get(id).map(|e| *e.value())
    }

    // ── Tables ───────────────────────────────────────────────

    /// Insert a table, assigning its id. Rejects a number already in use.
    pub async fn insert_table(&self, number: u32, capacity: u32) -> Result<Table, StoreError> {
        let _gate = self.gate.read().await;
        let id = Ulid::new();
        match self.numbers.entry(number) {
            Entry::Occupied(_) => return Err(StoreError::DuplicateTableNumber(number)),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let table = Table {
            id,
            number,
            capacity,
        };
        if let Err(e) = self
            .append(Event::TableCreated {
                table: table.clone(),
            })
            .await
        {
            self.numbers.remove(&number);
            return Err(e);
        }
        self.tables
            .insert(id, Arc::new(RwLock::new(TableState::new(table.clone()))));
        Ok(table)
    }

    /// Overwrite a table record by id. Returns the number of rows affected.
    pub async fn update_table(&self, table: &Table) -> Result<u64, StoreError> {
        let _gate = self.gate.read().await;
        let Some(state) = self.table_state(&table.id) else {
            return Ok(0);
        };
        let mut guard = state.write().await;
        let old_number = guard.table.number;
        let renumbered = old_number != table.number;
        if renumbered {
            match self.numbers.entry(table.number) {
                Entry::Occupied(_) => return Err(StoreError::DuplicateTableNumber(table.number)),
                Entry::Vacant(slot) => {
                    slot.insert(table.id);
                }
            }
        }

        if let Err(e) = self
            .append(Event::TableUpdated {
                table: table.clone(),
            })
            .await
        {
            if renumbered {
                self.numbers.remove(&table.number);
            }
            return Err(e);
        }
        if renumbered {
            self.numbers.remove(&old_number);
        }
        guard.table = table.clone();
        Ok(1)
    }

    pub async fn find_table(&self, id: &Ulid) -> Option<Table> {
        let state = self.table_state(id)?;
        let guard = state.read().await;
        Some(guard.table.clone())
    }

    pub async fn find_table_by_number(&self, number: u32) -> Option<Table> {
        let id = self.numbers.get(&number).map(|e| *e.value())?;
        self.find_table(&id).await
    }

    /// Tables matching `filter`, ordered by table number.
    pub async fn select_tables<F>(&self, filter: F) -> Vec<Table>
    where
        F: Fn(&Table) -> bool,
    {
        let mut out = Vec::new();
        for state in self.all_table_states() {
            let guard = state.read().await;
            if filter(&guard.table) {
                out.push(guard.table.clone());
            }
        }
        out.sort_by_key(|t| t.number);
        out
    }

    // ── Reservations ─────────────────────────────────────────

    pub async fn find_reservation(&self, id: &Ulid) -> Option<Reservation> {
        let mut table_id = self.table_for_reservation(id)?;
        loop {
            let state = self.table_state(&table_id)?;
            let guard = state.read().await;
            if let Some(r) = guard.reservation(*id) {
                return Some(r.clone());
            }
            drop(guard);
            // Moved to another table between the lookup and the read.
            match self.table_for_reservation(id) {
                Some(now) if now != table_id => table_id = now,
                _ => return None,
            }
        }
    }

    /// Reservations matching `filter`, optionally restricted to those
    /// overlapping `window`, ordered by start then id. Re-read on every call.
    pub async fn select_reservations<F>(&self, window: Option<Span>, filter: F) -> Vec<Reservation>
    where
        F: Fn(&Reservation) -> bool,
    {
        let mut out = Vec::new();
        for state in self.all_table_states() {
            let guard = state.read().await;
            match &window {
                Some(w) => out.extend(guard.overlapping(w).filter(|r| filter(*r)).cloned()),
                None => out.extend(guard.reservations.iter().filter(|r| filter(*r)).cloned()),
            }
        }
        out.sort_by_key(|r| (r.span.start, r.id));
        out
    }

    /// Begin a write transaction over `table_ids`.
    ///
    /// Locks are taken in ascending id order, so transactions over
    /// overlapping table sets never deadlock.
    pub async fn write(&self, table_ids: &[Ulid]) -> Result<WriteTxn<'_>, StoreError> {
        let gate = self.gate.read().await;
        let mut ids = table_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let state = self.table_state(&id).ok_or(StoreError::TableNotFound(id))?;
            guards.push(state.write_owned().await);
        }
        Ok(WriteTxn::new(self, gate, guards))
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Rewrite the WAL as the minimal event list recreating current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.gate.write().await;

        let mut states: Vec<(u32, SharedTableState)> = Vec::new();
        for state in self.all_table_states() {
            let number = state.read().await.table.number;
            states.push((number, state));
        }
        states.sort_by_key(|(number, _)| *number);

        let mut tables = Vec::with_capacity(states.len());
        let mut reservations = Vec::new();
        for (_, state) in &states {
            let guard = state.read().await;
            tables.push(Event::TableCreated {
                table: guard.table.clone(),
            });
            reservations.extend(guard.reservations.iter().map(|r| Event::ReservationCreated {
                reservation: r.clone(),
            }));
        }
        let count = tables.len() + reservations.len();
        tables.extend(reservations);

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Rewrite {
                events: tables,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)??;
        info!(path = %self.path.display(), events = count, "WAL compacted");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Rebuild in-memory state from one replayed event.
fn replay_event(
    states: &mut HashMap<Ulid, TableState>,
    reservation_tables: &DashMap<Ulid, Ulid>,
    event: Event,
) {
    match event {
        Event::TableCreated { table } => {
            states.insert(table.id, TableState::new(table));
        }
        Event::TableUpdated { table } => match states.get_mut(&table.id) {
            Some(state) => state.table = table,
            None => warn!(table = %table.id, "replay: update for unknown table"),
        },
        Event::ReservationCreated { reservation } => {
            let table_id = reservation.table_id;
            match states.get_mut(&table_id) {
                Some(state) => {
                    reservation_tables.insert(reservation.id, table_id);
                    state.insert_reservation(reservation);
                }
                None => warn!(table = %table_id, "replay: reservation on unknown table"),
            }
        }
        Event::ReservationUpdated {
            previous_table_id,
            reservation,
        } => {
            if let Some(prev) = states.get_mut(&previous_table_id) {
                prev.remove_reservation(reservation.id);
            }
            let table_id = reservation.table_id;
            match states.get_mut(&table_id) {
                Some(state) => {
                    reservation_tables.insert(reservation.id, table_id);
                    state.insert_reservation(reservation);
                }
                None => {
                    reservation_tables.remove(&reservation.id);
                    warn!(table = %table_id, "replay: reservation moved to unknown table");
                }
            }
        }
    }
}
