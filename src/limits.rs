use crate::model::{DAY_MS, Ms};

pub const MAX_TABLES: usize = 1_000;
pub const MAX_TABLE_CAPACITY: u32 = 500;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_PHONE_LEN: usize = 40;
pub const MAX_NOTES_LEN: usize = 2_000;

/// Longest single booking accepted.
pub const MAX_RESERVATION_DURATION_MS: Ms = DAY_MS;

/// Widest window accepted by availability queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 7 * DAY_MS;

/// Any frame claiming a larger payload is treated as corruption.
pub const MAX_WAL_FRAME_LEN: usize = 1 << 20;

/// Pending appends queued for the WAL writer.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;
