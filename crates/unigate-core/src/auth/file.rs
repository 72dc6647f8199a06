use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::store::{CredentialStore, StoreError, StoreKey};

/// Session file name in the data directory
pub const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSlot {
    value: String,
    updated_at: DateTime<Utc>,
}

/// Credential store backed by a single JSON file.
///
/// Each write rewrites the whole file. The file is removed once every
/// slot is empty.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store in `dir`, using the standard session file name
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SESSION_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When a slot was last written
    pub fn updated_at(&self, key: StoreKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.get(key.as_str()).map(|slot| slot.updated_at))
    }

    fn load(&self) -> Result<BTreeMap<String, StoredSlot>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, slots: &BTreeMap<String, StoredSlot>) -> Result<(), StoreError> {
        if slots.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
                debug!(path = %self.path.display(), "Removed empty session file");
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(slots)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.remove(key.as_str()).map(|slot| slot.value))
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut slots = self.load()?;
        slots.insert(
            key.as_str().to_string(),
            StoredSlot {
                value: value.to_string(),
                updated_at: Utc::now(),
            },
        );
        self.save(&slots)
    }

    fn delete(&self, key: StoreKey) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut slots = self.load()?;
        if slots.remove(key.as_str()).is_some() {
            self.save(&slots)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path().join("nested"));
        store.set(StoreKey::AccessToken, "access-1").unwrap();
        store.set(StoreKey::User, r#"{"username":"alice"}"#).unwrap();

        let reopened = FileStore::in_dir(dir.path().join("nested"));
        assert_eq!(reopened.get(StoreKey::AccessToken).unwrap().as_deref(), Some("access-1"));
        assert_eq!(
            reopened.get(StoreKey::User).unwrap().as_deref(),
            Some(r#"{"username":"alice"}"#)
        );
        assert_eq!(reopened.get(StoreKey::RefreshToken).unwrap(), None);
        assert!(reopened.updated_at(StoreKey::AccessToken).unwrap().is_some());
    }

    #[test]
    fn test_file_removed_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        store.set(StoreKey::RefreshToken, "r").unwrap();
        assert!(store.path().exists());

        store.delete(StoreKey::RefreshToken).unwrap();
        assert!(!store.path().exists());

        // Deleting from a missing file is not an error
        store.delete(StoreKey::AccessToken).unwrap();
    }

    #[test]
    fn test_corrupt_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_dir(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.get(StoreKey::AccessToken), Err(StoreError::Json(_))));
    }
}
