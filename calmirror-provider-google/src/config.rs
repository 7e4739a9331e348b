//! Settings for the Google Calendar mirror.

use std::path::PathBuf;

use serde::Deserialize;

fn default_calendar_id() -> String {
    "primary".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    /// Target calendar, `primary` for the account's main calendar
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// OAuth client credentials (`client_id`, `client_secret`)
    pub credentials_path: PathBuf,
    /// Previously obtained tokens, rewritten after each refresh
    pub tokens_path: PathBuf,
    /// Copy attendees to Google. Off by default: Google may email them.
    #[serde(default)]
    pub mirror_attendees: bool,
}
