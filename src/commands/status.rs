use std::path::Path;

use anyhow::Result;
use calmirror_core::{FileStateStore, StateStore, SyncToken};
use owo_colors::OwoColorize;

use crate::config::AppConfig;

pub fn run(config_path: &Path, config: &AppConfig, list_mappings: bool) -> Result<()> {
    let store = FileStateStore::open(&config.state_dir)?;
    let map = store.identity_map()?;

    println!("{}", "Paths".bold());
    println!("  Config:  {}", config_path.display());
    println!("  State:   {}", store.dir().display());
    println!();
    println!("{}", "Sync".bold());
    println!("  Source token:       {}", describe(store.source_token()?));
    println!("  Destination token:  {}", describe(store.destination_token()?));
    println!("  Mapped events:      {}", map.len());

    if list_mappings && !map.is_empty() {
        println!();
        println!("{}", "Mappings".bold());
        for (uid, id) in map.iter() {
            println!("  {} {} {}", uid, "->".dimmed(), id);
        }
    }

    Ok(())
}

fn describe(token: Option<SyncToken>) -> String {
    match token {
        Some(_) => format!("{}", "present".green()),
        None => format!("{}", "none (next sync is a full sync)".dimmed()),
    }
}
