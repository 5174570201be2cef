use crate::engine::ErrorKind;

// ── Booking metrics (request-driven) ────────────────────────────

/// Counter: reservations created.
pub const RESERVATIONS_CREATED_TOTAL: &str = "tablebook_reservations_created_total";

/// Counter: reservations updated (time, party, table or contact details).
pub const RESERVATIONS_UPDATED_TOTAL: &str = "tablebook_reservations_updated_total";

/// Counter: reservations moved to canceled.
pub const RESERVATIONS_CANCELED_TOTAL: &str = "tablebook_reservations_canceled_total";

/// Counter: lifecycle operations rejected. Labels: op, kind.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "tablebook_reservations_rejected_total";

/// Counter: writes refused because the slot was already booked.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "tablebook_reservation_conflicts_total";

/// Counter: availability queries answered.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "tablebook_availability_queries_total";

// ── Storage metrics ─────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "tablebook_wal_compactions_total";

/// Map an error kind to a short label for metrics.
pub fn error_kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidArgument => "invalid_argument",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Store => "store",
    }
}

/// Count a rejected lifecycle operation.
pub(crate) fn record_rejection(op: &'static str, kind: ErrorKind) {
    metrics::counter!(RESERVATIONS_REJECTED_TOTAL, "op" => op, "kind" => error_kind_label(kind))
        .increment(1);
}
