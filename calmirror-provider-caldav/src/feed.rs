//! [`SourceFeed`] over a CalDAV collection using sync-collection (RFC 6578).

use std::time::Duration;

use anyhow::Result;
use calmirror_core::{ChangeBatch, SourceEntity, SourceFeed, SyncError, SyncResult, SyncToken};
use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use crate::client::DavClient;
use crate::config::CalDavConfig;
use crate::discovery;
use crate::multistatus::{self, SyncPage};

/// Upper bound on truncated pages followed within one poll.
const MAX_PAGES: usize = 1000;

pub struct CalDavFeed {
    client: DavClient,
    calendar_url: Url,
}

fn backend(e: anyhow::Error) -> SyncError {
    SyncError::Backend(format!("CalDAV: {:#}", e))
}

impl CalDavFeed {
    /// Log in and resolve the calendar collection.
    pub async fn connect(config: &CalDavConfig, timeout: Duration) -> SyncResult<Self> {
        let client = DavClient::new(&config.username, &config.password, timeout).map_err(backend)?;
        let calendar_url = discovery::resolve_calendar_url(&client, config)
            .await
            .map_err(backend)?;
        info!(url = %calendar_url, "Using CalDAV calendar");

        Ok(CalDavFeed {
            client,
            calendar_url,
        })
    }

    async fn report(&self, token: Option<&str>) -> Result<ReportOutcome> {
        let response = self
            .client
            .report(&self.calendar_url, sync_collection_body(token))
            .await?;

        if token_rejected(response.status, &response.body) {
            return Ok(ReportOutcome::TokenRejected(response.status));
        }

        if !response.status.is_success() {
            anyhow::bail!(
                "sync-collection REPORT on {} failed (status {}): {}",
                self.calendar_url,
                response.status,
                response.body
            );
        }

        Ok(ReportOutcome::Page(multistatus::sync_page(&response.body)?))
    }
}

enum ReportOutcome {
    Page(SyncPage),
    TokenRejected(StatusCode),
}

impl SourceFeed for CalDavFeed {
    async fn poll(&self, token: Option<&SyncToken>) -> SyncResult<ChangeBatch<SourceEntity>> {
        collect_pages(token, move |current| async move {
            self.report(current.as_deref()).await
        })
        .await
    }
}

/// Issue sync-collection requests through `fetch` until the result is no
/// longer truncated, folding every page into one batch. Each follow-up request
/// carries the token returned by the previous page.
async fn collect_pages<F, Fut>(
    token: Option<&SyncToken>,
    mut fetch: F,
) -> SyncResult<ChangeBatch<SourceEntity>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ReportOutcome>>,
{
    let incremental = token.is_some();
    let mut current = token.map(|t| t.as_str().to_string());
    let mut batch = ChangeBatch::default();

    for _ in 0..MAX_PAGES {
        let page = match fetch(current.clone()).await.map_err(backend)? {
            ReportOutcome::Page(page) => page,
            ReportOutcome::TokenRejected(status) => {
                return Err(SyncError::InvalidToken(format!(
                    "CalDAV sync-collection (status {})",
                    status
                )));
            }
        };

        let truncated = page.truncated;
        current = page.sync_token.clone().or(current);
        add_page(&mut batch, page, incremental);

        if !truncated {
            info!(
                added = batch.added.len(),
                changed = batch.changed.len(),
                removed = batch.removed.len(),
                "Polled CalDAV source"
            );
            return Ok(batch);
        }

        debug!("Result truncated, continuing from {:?}", current);
    }

    Err(SyncError::Backend(format!(
        "CalDAV: sync-collection still truncated after {} pages",
        MAX_PAGES
    )))
}

/// Fold one result page into `batch`.
///
/// 404 members are removals. Members without calendar data, or that are not
/// `.ics` resources, are skipped.
fn add_page(batch: &mut ChangeBatch<SourceEntity>, page: SyncPage, incremental: bool) {
    for entry in page.entries {
        if !entry.href.ends_with(".ics") {
            continue;
        }

        if entry.status == Some(404) {
            batch.removed.push(SourceEntity::removed(entry.href));
            continue;
        }

        let Some(data) = entry.calendar_data else {
            debug!(href = %entry.href, "Skipping member without calendar-data");
            continue;
        };

        let entity = SourceEntity {
            href: entry.href,
            etag: entry.etag,
            data: Some(data),
        };

        if incremental {
            batch.changed.push(entity);
        } else {
            batch.added.push(entity);
        }
    }

    if let Some(token) = page.sync_token {
        batch.next_token = Some(SyncToken::new(token));
    }
}

fn token_rejected(status: StatusCode, body: &str) -> bool {
    status.is_client_error() && body.contains("valid-sync-token")
}

fn sync_collection_body(token: Option<&str>) -> String {
    let token = match token {
        Some(token) => format!("<d:sync-token>{}</d:sync-token>", xml_escape(token)),
        None => "<d:sync-token/>".to_string(),
    };

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:sync-collection xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  {token}
  <d:sync-level>1</d:sync-level>
  <d:prop>
    <d:getetag/>
    <c:calendar-data/>
  </d:prop>
</d:sync-collection>"#
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
