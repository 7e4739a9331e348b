//! Durable sync state: continuation tokens and the identity map.

mod file;

pub use file::FileStateStore;

use crate::error::SyncResult;
use crate::identity_map::IdentityMap;
use crate::token::SyncToken;

/// Key-value store the reconciler persists its progress into.
///
/// Everything written must survive a process restart.
pub trait StateStore {
    fn source_token(&self) -> SyncResult<Option<SyncToken>>;

    fn set_source_token(&mut self, token: Option<&SyncToken>) -> SyncResult<()>;

    fn destination_token(&self) -> SyncResult<Option<SyncToken>>;

    fn set_destination_token(&mut self, token: Option<&SyncToken>) -> SyncResult<()>;

    fn identity_map(&self) -> SyncResult<IdentityMap>;

    fn save_identity_map(&mut self, map: &IdentityMap) -> SyncResult<()>;
}
