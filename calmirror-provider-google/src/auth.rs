//! OAuth access tokens: load, refresh when stale, write back.
//!
//! The consent flow happens elsewhere; this only consumes a tokens file
//! holding a refresh token.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth client credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Accepts both a flat `{client_id, client_secret}` file and the
/// `{"installed": {...}}` file downloaded from the Cloud console.
#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialsFile {
    Installed { installed: Credentials },
    Web { web: Credentials },
    Flat(Credentials),
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Google credentials not found.\n\n\
                Create {} with:\n\n\
                {{\n  \
                  \"client_id\": \"your-client-id.apps.googleusercontent.com\",\n  \
                  \"client_secret\": \"your-client-secret\"\n\
                }}\n\n\
                See https://console.cloud.google.com/apis/credentials for setup.",
                path.display()
            );
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials from {}", path.display()))?;

        let file: CredentialsFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials from {}", path.display()))?;

        Ok(match file {
            CredentialsFile::Installed { installed } => installed,
            CredentialsFile::Web { web } => web,
            CredentialsFile::Flat(creds) => creds,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tokens {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "No Google tokens at {}. Authorize calmirror and save the tokens there first.",
                path.display()
            );
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read tokens from {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse tokens from {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize tokens")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write tokens to {}", path.display()))?;

        // Owner-only, the file holds a refresh token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }

    /// Expired, about to expire, or of unknown age.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) >= expires_at,
            None => true,
        }
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Hands out a valid access token, refreshing it on demand.
pub struct TokenSource {
    http: reqwest::Client,
    credentials_path: PathBuf,
    tokens_path: PathBuf,
    tokens: Mutex<Tokens>,
}

impl TokenSource {
    pub fn load(credentials_path: &Path, tokens_path: &Path, timeout: StdDuration) -> Result<Self> {
        let tokens = Tokens::load(tokens_path)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(TokenSource {
            http,
            credentials_path: credentials_path.to_path_buf(),
            tokens_path: tokens_path.to_path_buf(),
            tokens: Mutex::new(tokens),
        })
    }

    pub async fn access_token(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;

        if tokens.needs_refresh(Utc::now()) {
            info!("Google access token expired, refreshing");
            *tokens = self.refresh(&tokens).await?;
            tokens.save(&self.tokens_path)?;
        }

        Ok(tokens.access_token.clone())
    }

    async fn refresh(&self, tokens: &Tokens) -> Result<Tokens> {
        let creds = Credentials::load(&self.credentials_path)?;

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", tokens.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("Failed to send token refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to refresh Google token (status {}): {}", status, error_text);
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        Ok(Tokens {
            access_token: refreshed.access_token,
            // Google usually keeps the old refresh token
            refresh_token: refreshed
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| tokens.refresh_token.clone()),
            expires_at: Some(Utc::now() + Duration::seconds(refreshed.expires_in)),
        })
    }
}
