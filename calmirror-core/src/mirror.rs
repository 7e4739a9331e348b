//! Destination side of a sync.

use crate::error::SyncResult;
use crate::event::CanonicalEvent;
use crate::feed::ChangeBatch;
use crate::token::SyncToken;

/// An event as seen in the destination calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredEvent {
    pub id: String,
    pub status: String,
    /// Source UID the event was created for, if it carries one
    pub correlation_key: Option<String>,
}

/// A calendar that mirrors source events.
#[allow(async_fn_in_trait)]
pub trait DestinationMirror {
    /// Create `event` and return its destination ID.
    ///
    /// When `correlation_key` is non-empty, other events already tagged with
    /// the same key are removed so a retried create never leaves duplicates.
    async fn create(&self, event: &CanonicalEvent, correlation_key: &str) -> SyncResult<String>;

    /// Replace the event stored under `id`.
    /// Fails with [`SyncError::NotFound`](crate::SyncError::NotFound) when it no longer exists.
    async fn update(&self, id: &str, event: &CanonicalEvent) -> SyncResult<()>;

    /// Delete the event stored under `id`. Deleting an absent event succeeds.
    async fn delete(&self, id: &str) -> SyncResult<()>;

    /// Changes on the destination since `token`. Informational only.
    async fn poll(&self, token: Option<&SyncToken>) -> SyncResult<ChangeBatch<MirroredEvent>>;
}
