//! Connection settings for a CalDAV source.

use std::fmt;

use serde::Deserialize;

pub const DEFAULT_SERVER_URL: &str = "https://caldav.icloud.com";

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

/// Where the source calendar lives and how to log in.
///
/// `calendar_url` skips discovery entirely. Otherwise the calendar is picked
/// from the account's calendar home by `calendar_name`, then `calendar_index`.
#[derive(Clone, Deserialize)]
pub struct CalDavConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub calendar_url: Option<String>,
    #[serde(default)]
    pub calendar_name: Option<String>,
    #[serde(default)]
    pub calendar_index: usize,
    pub username: String,
    /// App-specific password
    pub password: String,
}

impl CalDavConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        CalDavConfig {
            server_url: default_server_url(),
            calendar_url: None,
            calendar_name: None,
            calendar_index: 0,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn calendar_url(&self) -> Option<&str> {
        non_empty(&self.calendar_url)
    }

    pub fn calendar_name(&self) -> Option<&str> {
        non_empty(&self.calendar_name)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Debug for CalDavConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalDavConfig")
            .field("server_url", &self.server_url)
            .field("calendar_url", &self.calendar_url)
            .field("calendar_name", &self.calendar_name)
            .field("calendar_index", &self.calendar_index)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
