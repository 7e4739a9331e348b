//! CalDAV source for calmirror.
//!
//! Resolves a calendar collection (explicit URL or principal discovery) and
//! polls it with WebDAV sync-collection REPORTs.

mod client;
mod config;
mod discovery;
mod feed;
mod multistatus;

pub use config::{CalDavConfig, DEFAULT_SERVER_URL};
pub use feed::CalDavFeed;
