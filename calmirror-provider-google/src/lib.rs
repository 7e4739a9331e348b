//! Google Calendar destination for calmirror.
//!
//! Mirrored events carry the source UID in a private extended property
//! (`calmirrorUid`), which is how duplicates are found and removed.

mod auth;
mod config;
mod convert;
mod mirror;
mod types;

pub use auth::{Credentials, Tokens};
pub use config::GoogleConfig;
pub use convert::CORRELATION_PROPERTY;
pub use mirror::GoogleMirror;
