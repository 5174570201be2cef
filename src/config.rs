use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

/// Name of the WAL file inside the data directory.
pub const STORE_FILE: &str = "tablebook.wal";

/// Process configuration, read once from `TABLEBOOK_*` environment
/// variables. Unset or unparsable values fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Offset of the restaurant's wall clock from UTC.
    pub utc_offset: FixedOffset,
    /// Discard existing data on startup.
    pub reset_on_start: bool,
    /// JSON table layout used when the store has no tables yet.
    pub seed_file: Option<PathBuf>,
    /// WAL appends after which the log is compacted.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            utc_offset: Utc.fix(),
            reset_on_start: false,
            seed_file: None,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let utc_offset = match lookup("TABLEBOOK_UTC_OFFSET_MINUTES") {
            Some(raw) => match parse_offset_minutes(&raw) {
                Some(offset) => offset,
                None => {
                    warn!(value = %raw, "ignoring invalid TABLEBOOK_UTC_OFFSET_MINUTES");
                    defaults.utc_offset
                }
            },
            None => defaults.utc_offset,
        };
        Self {
            data_dir: lookup("TABLEBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            utc_offset,
            reset_on_start: lookup("TABLEBOOK_RESET_ON_START")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(defaults.reset_on_start),
            seed_file: lookup("TABLEBOOK_SEED_FILE")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            compact_threshold: lookup("TABLEBOOK_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }
}

fn parse_offset_minutes(raw: &str) -> Option<FixedOffset> {
    let minutes: i32 = raw.trim().parse().ok()?;
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
