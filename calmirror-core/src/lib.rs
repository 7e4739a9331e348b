//! Incremental sync core for calmirror.
//!
//! This crate holds everything that does not talk to a network:
//! - `ics` normalizes source iCalendar data into [`CanonicalEvent`]s
//! - [`IdentityMap`] and the [`StateStore`] trait persist sync progress
//! - [`SourceFeed`] and [`DestinationMirror`] are the backend seams
//! - [`Reconciler`] drives one sync cycle across them

pub mod error;
pub mod event;
pub mod feed;
pub mod ics;
pub mod identity_map;
pub mod mirror;
pub mod reconcile;
pub mod state;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SyncError, SyncResult};
pub use event::{CanonicalEvent, EventBound};
pub use feed::{ChangeBatch, SourceEntity, SourceFeed};
pub use identity_map::IdentityMap;
pub use mirror::{DestinationMirror, MirroredEvent};
pub use reconcile::{Reconciler, SyncOptions, SyncReport};
pub use state::{FileStateStore, StateStore};
pub use token::SyncToken;
