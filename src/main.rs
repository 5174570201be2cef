use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use tablebook::config::Config;
use tablebook::store::Store;
use tablebook::{Engine, compactor, seed};

/// Open (or reset) the store, seed the table layout on first run, compact
/// an oversized log and report what is on the books today.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;

    let path = config.store_path();
    let store = if config.reset_on_start {
        Store::open_fresh(&path)?
    } else {
        Store::open(&path)?
    };
    let store = Arc::new(store);
    let engine = Engine::new(store.clone(), config.utc_offset);

    let layout = match &config.seed_file {
        Some(file) => seed::load_layout(file)?,
        None => seed::default_layout(),
    };
    seed::ensure_tables(&engine, &layout).await?;

    compactor::compact_if_needed(&store, config.compact_threshold).await;

    let today = Utc::now().with_timezone(&config.utc_offset).date_naive();
    let booked = engine
        .list_for_day(today)
        .await?
        .into_iter()
        .filter(|r| r.is_active())
        .count();

    info!("tablebook ready");
    info!("  store: {}", path.display());
    info!("  utc offset: {}", config.utc_offset);
    info!("  tables: {}", store.table_count());
    info!("  reservations: {} ({booked} booked today)", store.reservation_count());
    Ok(())
}
