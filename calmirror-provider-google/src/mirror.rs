//! [`DestinationMirror`] over the Google Calendar v3 REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use calmirror_core::{
    CanonicalEvent, ChangeBatch, DestinationMirror, MirroredEvent, SyncError, SyncResult, SyncToken,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::auth::TokenSource;
use crate::config::GoogleConfig;
use crate::convert::{CORRELATION_PROPERTY, to_google, to_mirrored};
use crate::types::{EventsPage, GoogleEvent};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const MAX_RESULTS: &str = "250";

enum ListOutcome {
    Page(EventsPage),
    TokenExpired,
}

pub struct GoogleMirror {
    http: reqwest::Client,
    auth: TokenSource,
    api_base: Url,
    calendar_id: String,
    mirror_attendees: bool,
}

fn backend(e: anyhow::Error) -> SyncError {
    SyncError::Backend(format!("Google Calendar: {:#}", e))
}

fn is_gone(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND || status == StatusCode::GONE
}

async fn error_for(response: Response, what: &str) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::anyhow!("{} failed (status {}): {}", what, status, body)
}

impl GoogleMirror {
    pub fn new(config: &GoogleConfig, timeout: Duration) -> SyncResult<Self> {
        let auth = TokenSource::load(&config.credentials_path, &config.tokens_path, timeout)
            .map_err(backend)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")
            .map_err(backend)?;
        let api_base = Url::parse(API_BASE)
            .context("Invalid API base URL")
            .map_err(backend)?;

        Ok(GoogleMirror {
            http,
            auth,
            api_base,
            calendar_id: config.calendar_id.clone(),
            mirror_attendees: config.mirror_attendees,
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: Url) -> Self {
        self.api_base = api_base;
        self
    }

    /// `.../calendars/{calendar_id}/events[/{event_id}]`, path segments escaped.
    fn events_url(&self, event_id: Option<&str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow::anyhow!("Invalid API base URL"))?;
            segments.extend(["calendars", self.calendar_id.as_str(), "events"]);
            if let Some(id) = event_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let token = self.auth.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn list_page(&self, query: &[(&str, &str)]) -> Result<Response> {
        let response = self
            .request(Method::GET, self.events_url(None)?)
            .await?
            .query(query)
            .send()
            .await
            .context("Failed to list events")?;
        Ok(response)
    }

    /// Every event tagged with `correlation_key`.
    async fn find_tagged(&self, correlation_key: &str) -> Result<Vec<GoogleEvent>> {
        let filter = format!("{}={}", CORRELATION_PROPERTY, correlation_key);
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("privateExtendedProperty", filter.as_str()),
                ("maxResults", MAX_RESULTS),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self.list_page(&query).await?;
            if !response.status().is_success() {
                return Err(error_for(response, "Duplicate search").await);
            }

            let page: EventsPage = response
                .json()
                .await
                .context("Failed to parse event list")?;
            found.extend(page.items);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(found),
            }
        }
    }

    /// Insert the event, then delete any other event tagged with the same key.
    async fn create_event(&self, event: &CanonicalEvent, correlation_key: &str) -> Result<String> {
        let body = to_google(event, correlation_key, self.mirror_attendees);
        let response = self
            .request(Method::POST, self.events_url(None)?)
            .await?
            .query(&[("sendUpdates", "none")])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to create event: {}", event.summary))?;

        if !response.status().is_success() {
            return Err(error_for(response, &format!("Create of {}", event.uid)).await);
        }

        let created: GoogleEvent = response
            .json()
            .await
            .context("Failed to parse created event")?;

        if !correlation_key.is_empty() {
            for duplicate in self.find_tagged(correlation_key).await? {
                if duplicate.id == created.id {
                    continue;
                }
                warn!(
                    uid = correlation_key,
                    id = %duplicate.id,
                    "Removing duplicate"
                );
                self.delete_event(&duplicate.id).await?;
            }
        }

        Ok(created.id)
    }

    /// `Ok(false)` when the event does not exist.
    async fn update_event(&self, id: &str, event: &CanonicalEvent) -> Result<bool> {
        let body = to_google(event, &event.uid, self.mirror_attendees);
        let response = self
            .request(Method::PUT, self.events_url(Some(id))?)
            .await?
            .query(&[("sendUpdates", "none")])
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to update event: {}", event.summary))?;

        let status = response.status();
        if is_gone(status) {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(error_for(response, &format!("Update of {} ({})", event.uid, id)).await);
        }
        Ok(true)
    }

    async fn delete_event(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, self.events_url(Some(id))?)
            .await?
            .query(&[("sendUpdates", "none")])
            .send()
            .await
            .with_context(|| format!("Failed to delete event: {}", id))?;

        let status = response.status();
        if !status.is_success() && !is_gone(status) {
            return Err(error_for(response, &format!("Delete of {}", id)).await);
        }
        Ok(())
    }

    async fn list_changes(&self, sync_token: Option<&str>, page_token: Option<&str>) -> Result<ListOutcome> {
        let mut query = vec![("maxResults", MAX_RESULTS)];
        if let Some(token) = sync_token {
            query.push(("syncToken", token));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self.list_page(&query).await?;
        if response.status() == StatusCode::GONE {
            return Ok(ListOutcome::TokenExpired);
        }
        if !response.status().is_success() {
            return Err(error_for(response, "Event listing").await);
        }

        let page = response
            .json()
            .await
            .context("Failed to parse event list")?;
        Ok(ListOutcome::Page(page))
    }
}

impl DestinationMirror for GoogleMirror {
    async fn create(&self, event: &CanonicalEvent, correlation_key: &str) -> SyncResult<String> {
        let id = self
            .create_event(event, correlation_key)
            .await
            .map_err(backend)?;
        debug!(uid = %event.uid, id = %id, "Created Google event");
        Ok(id)
    }

    async fn update(&self, id: &str, event: &CanonicalEvent) -> SyncResult<()> {
        if self.update_event(id, event).await.map_err(backend)? {
            Ok(())
        } else {
            Err(SyncError::NotFound(id.to_string()))
        }
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        self.delete_event(id).await.map_err(backend)
    }

    async fn poll(&self, token: Option<&SyncToken>) -> SyncResult<ChangeBatch<MirroredEvent>> {
        let sync_token = token.map(SyncToken::as_str);
        let mut batch = ChangeBatch::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = match self
                .list_changes(sync_token, page_token.as_deref())
                .await
                .map_err(backend)?
            {
                ListOutcome::Page(page) => page,
                ListOutcome::TokenExpired => {
                    return Err(SyncError::InvalidToken("Google Calendar events.list (410 Gone)".into()));
                }
            };

            add_page(&mut batch, page.items, token.is_some());

            if let Some(next) = page.next_page_token {
                page_token = Some(next);
                continue;
            }

            batch.next_token = page.next_sync_token.map(SyncToken::new);
            return Ok(batch);
        }
    }
}

/// Cancelled events are removals; the rest are added or changed.
fn add_page(batch: &mut ChangeBatch<MirroredEvent>, items: Vec<GoogleEvent>, incremental: bool) {
    for item in items {
        let event = to_mirrored(item);
        if event.status == "cancelled" {
            batch.removed.push(event);
        } else if incremental {
            batch.changed.push(event);
        } else {
            batch.added.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
      "kind": "calendar#events",
      "summary": "me@gmail.com",
      "nextSyncToken": "CPDAlvWDx70CEPDAlvWDx70CGAU=",
      "items": [
        {"id": "a1", "status": "confirmed", "summary": "Standup",
         "start": {"dateTime": "2024-01-01T10:00:00Z", "timeZone": "UTC"},
         "end": {"dateTime": "2024-01-01T11:00:00Z", "timeZone": "UTC"},
         "extendedProperties": {"private": {"calmirrorUid": "uid-a"}}},
        {"id": "b2", "status": "cancelled"}
      ]
    }"#;

    #[test]
    fn test_events_page_parses() {
        let page: EventsPage = serde_json::from_str(PAGE).unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_page_token, None);
        assert_eq!(page.next_sync_token.as_deref(), Some("CPDAlvWDx70CEPDAlvWDx70CGAU="));
        assert_eq!(page.items[0].private_property(CORRELATION_PROPERTY), Some("uid-a"));
    }

    #[test]
    fn test_cancelled_events_are_removals() {
        let page: EventsPage = serde_json::from_str(PAGE).unwrap();
        let mut batch = ChangeBatch::default();
        add_page(&mut batch, page.items, true);

        assert_eq!(batch.changed.len(), 1);
        assert_eq!(batch.changed[0].correlation_key.as_deref(), Some("uid-a"));
        assert_eq!(batch.removed.len(), 1);
        assert_eq!(batch.removed[0].id, "b2");
        assert!(batch.added.is_empty());
    }

    #[test]
    fn test_gone_statuses() {
        assert!(is_gone(StatusCode::NOT_FOUND));
        assert!(is_gone(StatusCode::GONE));
        assert!(!is_gone(StatusCode::FORBIDDEN));
    }

    mod server {
        use std::collections::HashMap;
        use std::sync::{Arc, Mutex};

        use axum::extract::{Path, Query, State};
        use axum::http::StatusCode;
        use axum::response::{IntoResponse, Response};
        use axum::routing::{get, put};
        use axum::{Json, Router};
        use serde_json::{Value, json};

        /// Requests seen by the fake Calendar API, as "METHOD target".
        pub type Log = Arc<Mutex<Vec<String>>>;

        fn record(log: &Log, entry: String) {
            log.lock().unwrap().push(entry);
        }

        fn status_for(id: &str) -> Option<StatusCode> {
            match id {
                "missing" => Some(StatusCode::NOT_FOUND),
                "gone" => Some(StatusCode::GONE),
                _ => None,
            }
        }

        async fn list(State(log): State<Log>, Query(query): Query<HashMap<String, String>>) -> Response {
            if let Some(filter) = query.get("privateExtendedProperty") {
                record(&log, format!("SEARCH {filter}"));
                return Json(json!({
                    "items": [
                        {"id": "new-1", "status": "confirmed"},
                        {"id": "stray-1", "status": "confirmed"}
                    ]
                }))
                .into_response();
            }

            let sync_token = query.get("syncToken").map(String::as_str);
            let page_token = query.get("pageToken").map(String::as_str);
            record(&log, format!("LIST {sync_token:?} {page_token:?}"));

            match (sync_token, page_token) {
                (Some("stale"), _) => StatusCode::GONE.into_response(),
                (_, None) => Json(json!({
                    "items": [{"id": "e1", "status": "confirmed"}],
                    "nextPageToken": "p2"
                }))
                .into_response(),
                (_, Some(_)) => Json(json!({
                    "items": [{"id": "e2", "status": "cancelled"}],
                    "nextSyncToken": "sync-2"
                }))
                .into_response(),
            }
        }

        async fn insert(State(log): State<Log>) -> Json<Value> {
            record(&log, "POST".to_string());
            Json(json!({"id": "new-1", "status": "confirmed"}))
        }

        async fn update(State(log): State<Log>, Path((_, id)): Path<(String, String)>) -> Response {
            record(&log, format!("PUT {id}"));
            match status_for(&id) {
                Some(status) => status.into_response(),
                None => Json(json!({"id": id, "status": "confirmed"})).into_response(),
            }
        }

        async fn delete(State(log): State<Log>, Path((_, id)): Path<(String, String)>) -> StatusCode {
            record(&log, format!("DELETE {id}"));
            status_for(&id).unwrap_or(StatusCode::NO_CONTENT)
        }

        /// Serve the fake API on a local port and return its base URL.
        pub async fn start(log: Log) -> String {
            let app = Router::new()
                .route("/calendar/v3/calendars/{calendar}/events", get(list).post(insert))
                .route(
                    "/calendar/v3/calendars/{calendar}/events/{id}",
                    put(update).delete(delete),
                )
                .with_state(log);

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            format!("http://{addr}/calendar/v3")
        }
    }

    struct Fixture {
        mirror: GoogleMirror,
        log: server::Log,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn requests(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let tokens_path = dir.path().join("tokens.json");
        std::fs::write(
            &tokens_path,
            r#"{"access_token": "at", "refresh_token": "rt", "expires_at": "2100-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let config = GoogleConfig {
            calendar_id: "primary".into(),
            credentials_path: dir.path().join("credentials.json"),
            tokens_path,
            mirror_attendees: false,
        };

        let log = server::Log::default();
        let base = server::start(log.clone()).await;
        let mirror = GoogleMirror::new(&config, Duration::from_secs(5))
            .unwrap()
            .with_api_base(Url::parse(&base).unwrap());

        Fixture {
            mirror,
            log,
            _dir: dir,
        }
    }

    fn event() -> CanonicalEvent {
        calmirror_core::ics::normalize(
            "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:uid-a\r\nSUMMARY:Standup\r\nDTSTART:20240101T100000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_update_of_missing_event_is_not_found() {
        let f = fixture().await;

        f.mirror.update("e1", &event()).await.unwrap();
        for id in ["missing", "gone"] {
            let err = f.mirror.update(id, &event()).await.unwrap_err();
            assert!(err.is_not_found(), "{id}: {err}");
        }
    }

    #[tokio::test]
    async fn test_delete_of_missing_event_succeeds() {
        let f = fixture().await;

        f.mirror.delete("e1").await.unwrap();
        f.mirror.delete("missing").await.unwrap();
        f.mirror.delete("gone").await.unwrap();

        assert_eq!(f.requests(), vec!["DELETE e1", "DELETE missing", "DELETE gone"]);
    }

    #[tokio::test]
    async fn test_poll_follows_pages_into_one_batch() {
        let f = fixture().await;

        let batch = f.mirror.poll(Some(&SyncToken::new("sync-1"))).await.unwrap();

        assert_eq!(batch.changed.len(), 1);
        assert_eq!(batch.changed[0].id, "e1");
        assert_eq!(batch.removed.len(), 1);
        assert_eq!(batch.removed[0].id, "e2");
        assert_eq!(batch.next_token, Some(SyncToken::new("sync-2")));
        assert_eq!(
            f.requests(),
            vec![
                r#"LIST Some("sync-1") None"#,
                r#"LIST Some("sync-1") Some("p2")"#
            ]
        );
    }

    #[tokio::test]
    async fn test_poll_with_expired_token_is_invalid_token() {
        let f = fixture().await;

        let err = f.mirror.poll(Some(&SyncToken::new("stale"))).await.unwrap_err();

        assert!(err.is_invalid_token());
    }

    #[tokio::test]
    async fn test_create_inserts_then_removes_other_tagged_events() {
        let f = fixture().await;

        let id = f.mirror.create(&event(), "uid-a").await.unwrap();

        assert_eq!(id, "new-1");
        assert_eq!(
            f.requests(),
            vec!["POST", "SEARCH calmirrorUid=uid-a", "DELETE stray-1"]
        );
    }
}
