//! Initial table layout for an empty store.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{Engine, EngineError};

/// One table of a layout file: `[{"number": 1, "capacity": 2}, ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSeed {
    pub number: u32,
    pub capacity: u32,
}

/// Number and seat count of the default dining room.
const DEFAULT_LAYOUT: [(u32, u32); 10] = [
    (1, 2),
    (2, 12),
    (3, 6),
    (4, 4),
    (5, 5),
    (6, 4),
    (7, 4),
    (8, 2),
    (9, 2),
    (10, 20),
];

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("cannot read layout file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid layout file: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn default_layout() -> Vec<TableSeed> {
    DEFAULT_LAYOUT
        .iter()
        .map(|&(number, capacity)| TableSeed { number, capacity })
        .collect()
}

pub fn load_layout(path: &Path) -> Result<Vec<TableSeed>, SeedError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Create `layout` if the store has no tables yet. Returns how many tables
/// were created; a store that already has tables is left untouched.
pub async fn ensure_tables(engine: &Engine, layout: &[TableSeed]) -> Result<usize, EngineError> {
    if engine.store().table_count() > 0 {
        return Ok(0);
    }
    for seed in layout {
        engine.add_table(seed.number, seed.capacity).await?;
    }
    info!(tables = layout.len(), "seeded table layout");
    Ok(layout.len())
}
