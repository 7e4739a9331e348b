//! Opaque continuation tokens issued by a backend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A watermark in a backend's change history.
///
/// `None` in place of a token means "enumerate everything".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncToken(String);

impl SyncToken {
    pub fn new(token: impl Into<String>) -> Self {
        SyncToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SyncToken {
    fn from(token: String) -> Self {
        SyncToken(token)
    }
}

impl From<&str> for SyncToken {
    fn from(token: &str) -> Self {
        SyncToken(token.to_string())
    }
}
