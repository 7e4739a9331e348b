//! calmirror configuration at ~/.config/calmirror/config.toml
//!
//! Every key can be overridden from the environment with a `CALMIRROR__`
//! prefix and `__` between sections, e.g. `CALMIRROR__SOURCE__PASSWORD`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use calmirror_provider_caldav::{CalDavConfig, DEFAULT_SERVER_URL};
use calmirror_provider_google::GoogleConfig;
use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;

const ENV_PREFIX: &str = "CALMIRROR";
const ENV_SEPARATOR: &str = "__";

static DEFAULT_STATE_DIR: &str = "~/.local/share/calmirror";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub state_dir: PathBuf,
    pub source: CalDavConfig,
    pub destination: GoogleConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_true")]
    pub poll_destination: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            poll_destination: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SyncSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Could not determine config directory")?
        .join("calmirror"))
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load `path`, writing a commented template first if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            create_default_config(path)?;
            info!("Created default config at {}", path.display());
        }

        Self::build(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn build(path: &Path, env: Environment) -> Result<Self> {
        let google_dir = config_dir()?.join("google");

        let config: AppConfig = Config::builder()
            .set_default("state_dir", DEFAULT_STATE_DIR)?
            .set_default(
                "destination.credentials_path",
                google_dir.join("credentials.json").to_string_lossy().into_owned(),
            )?
            .set_default(
                "destination.tokens_path",
                google_dir.join("tokens.json").to_string_lossy().into_owned(),
            )?
            .add_source(File::from(path.to_path_buf()).required(false))
            .add_source(env.separator(ENV_SEPARATOR).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read config from {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        Ok(config.expanded())
    }

    fn expanded(mut self) -> Self {
        self.state_dir = expand(&self.state_dir);
        self.destination.credentials_path = expand(&self.destination.credentials_path);
        self.destination.tokens_path = expand(&self.destination.tokens_path);
        self
    }
}

/// Write a config template with placeholders to fill in.
fn create_default_config(path: &Path) -> Result<()> {
    let contents = format!(
        "\
# calmirror configuration

# Where sync tokens and the event map are kept:
# state_dir = \"{DEFAULT_STATE_DIR}\"

[source]
# server_url = \"{DEFAULT_SERVER_URL}\"
# Explicit calendar collection URL (skips discovery):
# calendar_url = \"\"
# Otherwise pick a calendar by name, or by position (default 0):
# calendar_name = \"Home\"
# calendar_index = 0
username = \"me@icloud.com\"
# App-specific password (or set CALMIRROR__SOURCE__PASSWORD):
password = \"\"

[destination]
# calendar_id = \"primary\"
# credentials_path = \"~/.config/calmirror/google/credentials.json\"
# tokens_path = \"~/.config/calmirror/google/tokens.json\"
# mirror_attendees = false

[sync]
# poll_destination = true
# timeout_secs = 30
"
    );

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create config directory {}", parent.display()))?;
    }

    std::fs::write(path, contents)
        .with_context(|| format!("Could not write config file {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(config::Map::new()))
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[source]\nusername = \"me@icloud.com\"\npassword = \"pw\"\n[destination]\n",
        )
        .unwrap();

        let config = AppConfig::build(&path, no_env()).unwrap();

        assert_eq!(config.source.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.destination.calendar_id, "primary");
        assert!(!config.destination.mirror_attendees);
        assert!(config.destination.tokens_path.ends_with("google/tokens.json"));
        assert!(config.sync.poll_destination);
        assert_eq!(config.sync.timeout(), Duration::from_secs(30));
        assert!(!config.state_dir.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "state_dir = \"/tmp/calmirror-state\"\n[source]\nusername = \"me@icloud.com\"\npassword = \"\"\n[destination]\n[sync]\ntimeout_secs = 10\n",
        )
        .unwrap();

        let env: config::Map<String, String> = [
            ("CALMIRROR__SOURCE__PASSWORD".to_string(), "from-env".to_string()),
            ("CALMIRROR__SYNC__POLL_DESTINATION".to_string(), "false".to_string()),
        ]
        .into_iter()
        .collect();
        let config =
            AppConfig::build(&path, Environment::with_prefix(ENV_PREFIX).source(Some(env))).unwrap();

        assert_eq!(config.source.password, "from-env");
        assert!(!config.sync.poll_destination);
        assert_eq!(config.sync.timeout_secs, 10);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/calmirror-state"));
    }

    #[test]
    fn test_default_template_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        create_default_config(&path).unwrap();
        let config = AppConfig::build(&path, no_env()).unwrap();

        assert_eq!(config.source.username, "me@icloud.com");
        assert_eq!(config.source.calendar_url(), None);
    }
}
