//! TOML-backed state store.
//!
//! Layout inside the state directory:
//!   sync_state.toml   source_sync_token / destination_sync_token
//!   event_map.toml    [event_map] uid = "destination id", [source_hrefs]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::{SyncError, SyncResult};
use crate::identity_map::IdentityMap;
use crate::state::StateStore;
use crate::token::SyncToken;

const SYNC_STATE_FILE: &str = "sync_state.toml";
const EVENT_MAP_FILE: &str = "event_map.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SyncState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_sync_token: Option<SyncToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    destination_sync_token: Option<SyncToken>,
}

/// State store writing human-readable TOML files into one directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Open (and create if needed) the state directory.
    pub fn open(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileStateStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned + Default>(&self, name: &str) -> SyncResult<T> {
        let path = self.dir.join(name);

        if !path.exists() {
            return Ok(T::default());
        }

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| SyncError::State(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Write through a temp file and rename so a crash never leaves a torn file.
    fn write<T: Serialize>(&self, name: &str, value: &T) -> SyncResult<()> {
        let path = self.dir.join(name);
        let temp = self.dir.join(format!("{name}.tmp"));

        let content = toml::to_string_pretty(value)
            .map_err(|e| SyncError::State(format!("Failed to serialize {}: {}", name, e)))?;

        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }

    fn update_sync_state(&self, update: impl FnOnce(&mut SyncState)) -> SyncResult<()> {
        let mut state: SyncState = self.read(SYNC_STATE_FILE)?;
        update(&mut state);
        self.write(SYNC_STATE_FILE, &state)
    }
}

impl StateStore for FileStateStore {
    fn source_token(&self) -> SyncResult<Option<SyncToken>> {
        Ok(self.read::<SyncState>(SYNC_STATE_FILE)?.source_sync_token)
    }

    fn set_source_token(&mut self, token: Option<&SyncToken>) -> SyncResult<()> {
        self.update_sync_state(|state| state.source_sync_token = token.cloned())
    }

    fn destination_token(&self) -> SyncResult<Option<SyncToken>> {
        Ok(self.read::<SyncState>(SYNC_STATE_FILE)?.destination_sync_token)
    }

    fn set_destination_token(&mut self, token: Option<&SyncToken>) -> SyncResult<()> {
        self.update_sync_state(|state| state.destination_sync_token = token.cloned())
    }

    fn identity_map(&self) -> SyncResult<IdentityMap> {
        self.read(EVENT_MAP_FILE)
    }

    fn save_identity_map(&mut self, map: &IdentityMap) -> SyncResult<()> {
        self.write(EVENT_MAP_FILE, map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_read_as_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path().join("state")).unwrap();

        assert_eq!(store.source_token().unwrap(), None);
        assert_eq!(store.destination_token().unwrap(), None);
        assert!(store.identity_map().unwrap().is_empty());
    }

    #[test]
    fn test_tokens_are_stored_independently() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStateStore::open(dir.path()).unwrap();

        store
            .set_source_token(Some(&SyncToken::new("http://example.com/sync/1")))
            .unwrap();
        store
            .set_destination_token(Some(&SyncToken::new("CPDAlvWDx70CEPDAlvWDx70CGAU=")))
            .unwrap();
        store.set_source_token(None).unwrap();

        let reopened = FileStateStore::open(dir.path()).unwrap();
        assert_eq!(reopened.source_token().unwrap(), None);
        assert_eq!(
            reopened.destination_token().unwrap(),
            Some(SyncToken::new("CPDAlvWDx70CEPDAlvWDx70CGAU="))
        );
    }

    #[test]
    fn test_identity_map_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStateStore::open(dir.path()).unwrap();

        let mut map = IdentityMap::new();
        map.insert("4F1C-UID@example.com", "abc123google");
        map.remember_href("/1/calendars/home/4F1C.ics", "4F1C-UID@example.com");
        store.save_identity_map(&map).unwrap();

        let reopened = FileStateStore::open(dir.path()).unwrap();
        assert_eq!(reopened.identity_map().unwrap(), map);
        assert!(!dir.path().join("event_map.toml.tmp").exists());

        let content = std::fs::read_to_string(dir.path().join("event_map.toml")).unwrap();
        assert!(content.contains("abc123google"));
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sync_state.toml"), "source_sync_token = [").unwrap();
        let store = FileStateStore::open(dir.path()).unwrap();

        assert!(matches!(store.source_token(), Err(SyncError::State(_))));
    }
}
