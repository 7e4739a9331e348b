use anyhow::{Context, Result};
use calmirror_core::{FileStateStore, Reconciler, SyncOptions, SyncReport};
use calmirror_provider_caldav::CalDavFeed;
use calmirror_provider_google::GoogleMirror;
use owo_colors::OwoColorize;

use crate::config::AppConfig;
use crate::lock;

pub async fn run(config: &AppConfig) -> Result<()> {
    let _lock = lock::acquire(&config.state_dir)?;
    let timeout = config.sync.timeout();

    let source = CalDavFeed::connect(&config.source, timeout)
        .await
        .context("Failed to connect to CalDAV source")?;
    let destination = GoogleMirror::new(&config.destination, timeout)
        .context("Failed to set up Google Calendar")?;
    let store = FileStateStore::open(&config.state_dir)?;

    let options = SyncOptions {
        poll_destination: config.sync.poll_destination,
    };

    let report = Reconciler::new(source, destination, store, options)
        .sync()
        .await
        .context("Sync failed")?;

    println!("{}", render(&report));
    Ok(())
}

fn render(report: &SyncReport) -> String {
    if report.mutations() == 0 && report.skipped == 0 {
        return format!("{}", "Already in sync".dimmed());
    }

    let mut lines = vec![format!(
        "{} {} created, {} updated, {} deleted",
        "Synced:".green(),
        report.created + report.recreated,
        report.updated,
        report.deleted
    )];

    if report.recreated > 0 {
        lines.push(format!(
            "   {} re-created after disappearing from Google",
            report.recreated
        ));
    }

    if report.skipped > 0 {
        lines.push(format!(
            "   {}",
            format!("{} skipped (unreadable source events)", report.skipped).yellow()
        ));
    }

    if report.full_resyncs > 0 {
        lines.push(format!(
            "   {}",
            "Source sync token expired, did a full resync".yellow()
        ));
    }

    lines.join("\n")
}
