//! In-memory backends that record every call, for reconciler tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use crate::error::{SyncError, SyncResult};
use crate::event::CanonicalEvent;
use crate::feed::{ChangeBatch, SourceEntity, SourceFeed};
use crate::identity_map::IdentityMap;
use crate::mirror::{DestinationMirror, MirroredEvent};
use crate::state::StateStore;
use crate::token::SyncToken;

/// Minimal timed VEVENT.
pub fn ics_event(uid: &str, summary: &str, sequence: i64) -> String {
    [
        "BEGIN:VCALENDAR",
        "VERSION:2.0",
        "PRODID:-//Test//EN",
        "BEGIN:VEVENT",
        &format!("UID:{uid}"),
        &format!("SEQUENCE:{sequence}"),
        &format!("SUMMARY:{summary}"),
        "DTSTART:20240101T100000Z",
        "DTEND:20240101T110000Z",
        "END:VEVENT",
        "END:VCALENDAR",
        "",
    ]
    .join("\r\n")
}

fn version_token(version: u64) -> SyncToken {
    SyncToken::new(format!("v{version}"))
}

fn parse_version(token: &SyncToken) -> Option<u64> {
    token.as_str().strip_prefix('v')?.parse().ok()
}

#[derive(Default)]
struct SourceState {
    version: u64,
    resources: BTreeMap<String, String>,
    /// (version, href) for every mutation
    log: Vec<(u64, String)>,
    /// Tokens older than this are rejected
    oldest_valid: u64,
    failures: VecDeque<SyncError>,
    polls: Vec<Option<SyncToken>>,
}

/// A versioned collection that issues `v<N>` tokens.
#[derive(Default)]
pub struct FakeSource {
    state: RefCell<SourceState>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, href: &str, data: &str) {
        let mut state = self.state.borrow_mut();
        state.version += 1;
        let version = state.version;
        state.resources.insert(href.to_string(), data.to_string());
        state.log.push((version, href.to_string()));
    }

    pub fn remove(&self, href: &str) {
        let mut state = self.state.borrow_mut();
        state.version += 1;
        let version = state.version;
        state.resources.remove(href);
        state.log.push((version, href.to_string()));
    }

    /// Reject every token issued so far, as a server does after trimming its change log.
    pub fn expire_tokens(&self) {
        let mut state = self.state.borrow_mut();
        state.version += 1;
        state.oldest_valid = state.version;
    }

    /// Make the next poll fail with `error`.
    pub fn fail_next(&self, error: SyncError) {
        self.state.borrow_mut().failures.push_back(error);
    }

    pub fn polls(&self) -> Vec<Option<SyncToken>> {
        self.state.borrow().polls.clone()
    }
}

impl SourceFeed for FakeSource {
    async fn poll(&self, token: Option<&SyncToken>) -> SyncResult<ChangeBatch<SourceEntity>> {
        let mut state = self.state.borrow_mut();
        state.polls.push(token.cloned());

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let entity = |href: &str, data: &str| SourceEntity {
            href: href.to_string(),
            etag: None,
            data: Some(data.to_string()),
        };

        let mut batch = ChangeBatch {
            next_token: Some(version_token(state.version)),
            ..ChangeBatch::default()
        };

        let Some(token) = token else {
            batch.added = state
                .resources
                .iter()
                .map(|(href, data)| entity(href, data))
                .collect();
            return Ok(batch);
        };

        let since = parse_version(token)
            .filter(|v| *v >= state.oldest_valid)
            .ok_or_else(|| SyncError::InvalidToken(format!("fake source ({token})")))?;

        let mut touched: Vec<&String> = Vec::new();
        for (version, href) in &state.log {
            if *version > since && !touched.contains(&href) {
                touched.push(href);
            }
        }

        for href in touched {
            match state.resources.get(href) {
                Some(data) => batch.changed.push(entity(href, data)),
                None => batch.removed.push(SourceEntity::removed(href.as_str())),
            }
        }

        Ok(batch)
    }
}

/// A call observed by [`FakeMirror`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorCall {
    Create { uid: String, id: String },
    Update { id: String },
    Delete { id: String },
    Poll { token: Option<SyncToken> },
}

#[derive(Default)]
struct MirrorState {
    next_id: u64,
    /// id -> (event, correlation key)
    events: BTreeMap<String, (CanonicalEvent, String)>,
    poll_failures: VecDeque<SyncError>,
    calls: Vec<MirrorCall>,
}

/// Destination calendar held in memory.
#[derive(Default)]
pub struct FakeMirror {
    state: RefCell<MirrorState>,
}

impl FakeMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MirrorCall> {
        self.state.borrow().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&MirrorCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| matches(c)).count()
    }

    pub fn mutations(&self) -> usize {
        self.count(|c| !matches!(c, MirrorCall::Poll { .. }))
    }

    pub fn event(&self, id: &str) -> Option<CanonicalEvent> {
        self.state.borrow().events.get(id).map(|(e, _)| e.clone())
    }

    pub fn len(&self) -> usize {
        self.state.borrow().events.len()
    }

    /// Delete an event behind the reconciler's back.
    pub fn remove_externally(&self, id: &str) {
        self.state.borrow_mut().events.remove(id);
    }

    /// Store an event without recording a call.
    pub fn seed(&self, id: &str, event: CanonicalEvent, key: &str) {
        self.state
            .borrow_mut()
            .events
            .insert(id.to_string(), (event, key.to_string()));
    }

    /// IDs of stored events carrying `key`.
    pub fn tagged(&self, key: &str) -> Vec<String> {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|(_, (_, k))| k == key)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn fail_next_poll(&self, error: SyncError) {
        self.state.borrow_mut().poll_failures.push_back(error);
    }
}

impl DestinationMirror for FakeMirror {
    async fn create(&self, event: &CanonicalEvent, correlation_key: &str) -> SyncResult<String> {
        let mut state = self.state.borrow_mut();
        if !correlation_key.is_empty() {
            state.events.retain(|_, (_, key)| key.as_str() != correlation_key);
        }
        state.next_id += 1;
        let id = format!("g{}", state.next_id);
        state
            .events
            .insert(id.clone(), (event.clone(), correlation_key.to_string()));
        state.calls.push(MirrorCall::Create {
            uid: event.uid.clone(),
            id: id.clone(),
        });
        Ok(id)
    }

    async fn update(&self, id: &str, event: &CanonicalEvent) -> SyncResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(MirrorCall::Update { id: id.to_string() });
        match state.events.get_mut(id) {
            Some(stored) => {
                stored.0 = event.clone();
                Ok(())
            }
            None => Err(SyncError::NotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(MirrorCall::Delete { id: id.to_string() });
        state.events.remove(id);
        Ok(())
    }

    async fn poll(&self, token: Option<&SyncToken>) -> SyncResult<ChangeBatch<MirroredEvent>> {
        let mut state = self.state.borrow_mut();
        state.calls.push(MirrorCall::Poll {
            token: token.cloned(),
        });
        if let Some(error) = state.poll_failures.pop_front() {
            return Err(error);
        }

        let added = state
            .events
            .iter()
            .map(|(id, (_, key))| MirroredEvent {
                id: id.clone(),
                status: "confirmed".into(),
                correlation_key: Some(key.clone()),
            })
            .collect();

        Ok(ChangeBatch {
            added,
            next_token: Some(SyncToken::new(format!("d{}", state.next_id))),
            ..ChangeBatch::default()
        })
    }
}

/// State store kept in memory, counting map saves.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub source_token: Option<SyncToken>,
    pub destination_token: Option<SyncToken>,
    pub map: IdentityMap,
    pub map_saves: usize,
}

impl StateStore for MemoryStore {
    fn source_token(&self) -> SyncResult<Option<SyncToken>> {
        Ok(self.source_token.clone())
    }

    fn set_source_token(&mut self, token: Option<&SyncToken>) -> SyncResult<()> {
        self.source_token = token.cloned();
        Ok(())
    }

    fn destination_token(&self) -> SyncResult<Option<SyncToken>> {
        Ok(self.destination_token.clone())
    }

    fn set_destination_token(&mut self, token: Option<&SyncToken>) -> SyncResult<()> {
        self.destination_token = token.cloned();
        Ok(())
    }

    fn identity_map(&self) -> SyncResult<IdentityMap> {
        Ok(self.map.clone())
    }

    fn save_identity_map(&mut self, map: &IdentityMap) -> SyncResult<()> {
        self.map = map.clone();
        self.map_saves += 1;
        Ok(())
    }
}
