use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC. Every stored instant uses this type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` for zero-length or inverted input.
    pub fn checked(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// `None` when the span is too wide to measure in `Ms`.
    pub fn duration_ms(&self) -> Option<Ms> {
        self.end.checked_sub(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Gives every stored record kind a uniform identifier accessor.
pub trait Record {
    fn id(&self) -> Ulid;
}

/// A physical seating unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: Ulid,
    /// Unique display key.
    pub number: u32,
    pub capacity: u32,
}

impl Record for Table {
    fn id(&self) -> Ulid {
        self.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Placeholder; never produced by the booking flow.
    #[default]
    Free,
    Booked,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub table_id: Ulid,
    pub name: String,
    pub party_size: u32,
    pub span: Span,
    pub status: ReservationStatus,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Booked
    }
}

impl Record for Reservation {
    fn id(&self) -> Ulid {
        self.id
    }
}

/// A reservation before the store has assigned its identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub table_id: Ulid,
    pub name: String,
    pub party_size: u32,
    pub span: Span,
    pub status: ReservationStatus,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl NewReservation {
    pub(crate) fn with_id(self, id: Ulid) -> Reservation {
        Reservation {
            id,
            table_id: self.table_id,
            name: self.name,
            party_size: self.party_size,
            span: self.span,
            status: self.status,
            phone: self.phone,
            notes: self.notes,
        }
    }
}

/// One table and its reservations, kept sorted by `span.start`.
/// This is the `(table_id, start, end)` index of the store.
#[derive(Debug, Clone)]
pub struct TableState {
    pub table: Table,
    pub reservations: Vec<Reservation>,
}

impl TableState {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    /// Reservations of any status whose span overlaps `query`.
    /// Everything at index >= the partition point starts at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// WAL record format. Flat: each variant carries the full record it writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TableCreated {
        table: Table,
    },
    TableUpdated {
        table: Table,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    /// Covers time, party, table moves and cancellation alike.
    ReservationUpdated {
        previous_table_id: Ulid,
        reservation: Reservation,
    },
}
