//! Source side of a sync: an incremental change feed.

use crate::error::SyncResult;
use crate::token::SyncToken;

/// Changes reported by one poll of a backend.
///
/// `removed` entries carry identity only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch<T> {
    pub added: Vec<T>,
    pub changed: Vec<T>,
    pub removed: Vec<T>,
    /// Token to resume from, when the backend issued one
    pub next_token: Option<SyncToken>,
}

impl<T> Default for ChangeBatch<T> {
    fn default() -> Self {
        ChangeBatch {
            added: Vec::new(),
            changed: Vec::new(),
            removed: Vec::new(),
            next_token: None,
        }
    }
}

impl<T> ChangeBatch<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }

    /// Append another page of the same window. The later page's token wins.
    pub fn extend(&mut self, page: ChangeBatch<T>) {
        self.added.extend(page.added);
        self.changed.extend(page.changed);
        self.removed.extend(page.removed);
        if page.next_token.is_some() {
            self.next_token = page.next_token;
        }
    }
}

/// One resource in the source calendar collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntity {
    /// Resource location, unique within the collection
    pub href: String,
    pub etag: Option<String>,
    /// Raw iCalendar text; `None` for removals
    pub data: Option<String>,
}

impl SourceEntity {
    pub fn removed(href: impl Into<String>) -> Self {
        SourceEntity {
            href: href.into(),
            etag: None,
            data: None,
        }
    }
}

/// A backend that can list what changed since a continuation token.
#[allow(async_fn_in_trait)]
pub trait SourceFeed {
    /// With `None`, enumerate everything as `added` and return a fresh token.
    /// Otherwise return the changes since `token`, all pages accumulated.
    ///
    /// A stale or rejected token must surface as
    /// [`SyncError::InvalidToken`](crate::SyncError::InvalidToken).
    async fn poll(&self, token: Option<&SyncToken>) -> SyncResult<ChangeBatch<SourceEntity>>;
}
