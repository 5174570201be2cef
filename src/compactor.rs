use tracing::{info, warn};

use crate::observability::WAL_COMPACTIONS_TOTAL;
use crate::store::Store;

/// Compact the store's WAL once it has grown by `threshold` appends.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(store: &Store, threshold: u64) -> bool {
    if threshold == 0 {
        return false;
    }
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
            info!(appends, "compacted WAL");
            true
        }
        Err(e) => {
            warn!(error = %e, "WAL compaction failed");
            false
        }
    }
}
