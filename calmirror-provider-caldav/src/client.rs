//! Thin WebDAV client: PROPFIND and REPORT with basic auth.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use url::Url;

/// Raw outcome of a WebDAV request.
#[derive(Debug)]
pub struct DavResponse {
    pub status: StatusCode,
    /// Location after redirects
    pub url: Url,
    pub body: String,
}

#[derive(Clone)]
pub struct DavClient {
    http: reqwest::Client,
    username: String,
    password: String,
}

impl DavClient {
    pub fn new(username: &str, password: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(DavClient {
            http,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// PROPFIND that must come back as a multistatus.
    pub async fn propfind(&self, url: &Url, depth: &str, body: &str) -> Result<DavResponse> {
        let response = self.send("PROPFIND", url, depth, body.to_string()).await?;

        if !response.status.is_success() {
            anyhow::bail!(
                "PROPFIND {} failed (status {}): {}",
                url,
                response.status,
                response.body
            );
        }

        Ok(response)
    }

    /// REPORT; the caller interprets the status.
    pub async fn report(&self, url: &Url, body: String) -> Result<DavResponse> {
        self.send("REPORT", url, "1", body).await
    }

    async fn send(&self, method: &str, url: &Url, depth: &str, body: String) -> Result<DavResponse> {
        let method = Method::from_bytes(method.as_bytes())
            .with_context(|| format!("Invalid HTTP method {}", method))?;

        let response = self
            .http
            .request(method.clone(), url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", depth)
            .body(body)
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        let status = response.status();
        let url = response.url().clone();

        if status == StatusCode::UNAUTHORIZED {
            anyhow::bail!("Authentication failed for {}. Check username and app-specific password.", url);
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        Ok(DavResponse { status, url, body })
    }
}
