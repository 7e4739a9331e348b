//! Source UID → destination event ID mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The reconciler's memory of what it has already created downstream.
///
/// Holds at most one destination ID per source UID. `source_hrefs` remembers
/// which source resource carried each UID so deletions reported by href alone
/// can be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMap {
    #[serde(default)]
    event_map: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    source_hrefs: BTreeMap<String, String>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destination_id(&self, uid: &str) -> Option<&str> {
        self.event_map.get(uid).map(String::as_str)
    }

    /// Record (or overwrite) the destination ID for `uid`.
    pub fn insert(&mut self, uid: &str, destination_id: &str) {
        self.event_map
            .insert(uid.to_string(), destination_id.to_string());
    }

    /// Drop `uid` and every href pointing at it. Returns the destination ID it was mapped to.
    pub fn remove(&mut self, uid: &str) -> Option<String> {
        self.source_hrefs.retain(|_, mapped_uid| mapped_uid != uid);
        self.event_map.remove(uid)
    }

    /// Record that `uid` now lives at `href`. A UID has one current href, so
    /// any older href for it is forgotten.
    pub fn remember_href(&mut self, href: &str, uid: &str) {
        self.source_hrefs
            .retain(|known, mapped_uid| mapped_uid != uid || known == href);
        self.source_hrefs.insert(href.to_string(), uid.to_string());
    }

    pub fn uid_for_href(&self, href: &str) -> Option<&str> {
        self.source_hrefs.get(href).map(String::as_str)
    }

    /// The href `uid` was last seen at.
    pub fn href_for_uid(&self, uid: &str) -> Option<&str> {
        self.source_hrefs
            .iter()
            .find(|(_, mapped_uid)| mapped_uid.as_str() == uid)
            .map(|(href, _)| href.as_str())
    }

    pub fn len(&self) -> usize {
        self.event_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.event_map
            .iter()
            .map(|(uid, id)| (uid.as_str(), id.as_str()))
    }
}
