use anyhow::Result;
use calmirror_core::{FileStateStore, StateStore};
use tracing::info;

use crate::config::AppConfig;
use crate::lock;

/// Forget sync tokens. The event map is kept, so the next full sync updates
/// existing Google events instead of duplicating them.
pub fn run(config: &AppConfig, source: bool, destination: bool) -> Result<()> {
    let _lock = lock::acquire(&config.state_dir)?;
    let mut store = FileStateStore::open(&config.state_dir)?;

    // No flag means both
    let (source, destination) = if source || destination {
        (source, destination)
    } else {
        (true, true)
    };

    if source {
        store.set_source_token(None)?;
        info!("Cleared source sync token");
    }
    if destination {
        store.set_destination_token(None)?;
        info!("Cleared destination sync token");
    }

    println!("Sync tokens reset. The next sync re-reads the whole calendar.");
    Ok(())
}
