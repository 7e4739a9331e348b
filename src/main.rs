mod commands;
mod config;
mod lock;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "calmirror")]
#[command(about = "Mirror an iCloud (CalDAV) calendar into Google Calendar")]
struct Cli {
    /// Config file (default: ~/.config/calmirror/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull changes from the CalDAV calendar and apply them to Google
    Sync,
    /// Show where state lives and what has been synced
    Status {
        /// Also list every source UID and the Google event it maps to
        #[arg(long)]
        mappings: bool,
    },
    /// Forget sync tokens so the next sync re-reads everything
    Reset {
        /// Only reset the CalDAV token
        #[arg(long)]
        source: bool,

        /// Only reset the Google token
        #[arg(long)]
        destination: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load(&config_path)?;

    match cli.command {
        Commands::Sync => commands::sync::run(&config).await,
        Commands::Status { mappings } => commands::status::run(&config_path, &config, mappings),
        Commands::Reset {
            source,
            destination,
        } => commands::reset::run(&config, source, destination),
    }
}
