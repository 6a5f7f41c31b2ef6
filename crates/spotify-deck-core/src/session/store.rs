use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, ConfigLocator};

use super::{Credential, Language};

/// Errors surfaced by session persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The subset of session state that survives a restart, as a single named record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub version: u32,
    pub client_id: String,
    pub credential: Credential,
    pub search_query: String,
    pub language: Language,
}

pub(super) const SCHEMA_VERSION: u32 = 1;

/// Persistence abstraction for the session record.
pub trait SessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError>;
    fn save(&self, record: &PersistedSession) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Filesystem-backed session storage located in the user configuration directory.
pub struct FileSessionStore {
    locator: ConfigLocator,
}

impl FileSessionStore {
    pub fn new(locator: ConfigLocator) -> Self {
        Self { locator }
    }

    pub fn with_default_locator() -> Result<Self, StoreError> {
        Ok(Self::new(ConfigLocator::new()?))
    }

    fn write_file(path: &Path, payload: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(payload.as_bytes())?;
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata()?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm)?;
        }

        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        let path = self.locator.session_file();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        let record: PersistedSession = serde_json::from_str(&raw)?;
        Ok(Some(record))
    }

    fn save(&self, record: &PersistedSession) -> Result<(), StoreError> {
        let path = self.locator.session_file();
        let payload = serde_json::to_string_pretty(record)?;
        Self::write_file(&path, &payload)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let path = self.locator.session_file();
        match fs::remove_file(path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests and hosts that bring their own key-value storage.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<PersistedSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<PersistedSession>, StoreError> {
        Ok(self.inner.lock().expect("store poisoned").clone())
    }

    fn save(&self, record: &PersistedSession) -> Result<(), StoreError> {
        *self.inner.lock().expect("store poisoned") = Some(record.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.inner.lock().expect("store poisoned") = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn sample_record() -> PersistedSession {
        PersistedSession {
            version: SCHEMA_VERSION,
            client_id: "client-123".into(),
            credential: Credential::new(
                "token".into(),
                Some("refresh".into()),
                Utc::now() + Duration::minutes(5),
            ),
            search_query: "daft punk".into(),
            language: Language::En,
        }
    }

    #[test]
    fn round_trip_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let locator = ConfigLocator::from_root_for_tests(temp_dir.path().to_path_buf());
        let store = FileSessionStore::new(locator);
        let record = sample_record();
        store.save(&record).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.client_id, record.client_id);
        assert_eq!(loaded.credential.access_token, record.credential.access_token);
        assert_eq!(loaded.credential.refresh_token, record.credential.refresh_token);
        assert_eq!(loaded.search_query, record.search_query);
        assert_eq!(loaded.language, Language::En);
    }

    #[test]
    fn load_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let locator = ConfigLocator::from_root_for_tests(temp_dir.path().to_path_buf());
        let store = FileSessionStore::new(locator);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn clear_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let locator = ConfigLocator::from_root_for_tests(temp_dir.path().to_path_buf());
        let store = FileSessionStore::new(locator);
        store.clear().unwrap();
    }

    #[test]
    fn clear_removes_saved_record() {
        let temp_dir = TempDir::new().unwrap();
        let locator = ConfigLocator::from_root_for_tests(temp_dir.path().to_path_buf());
        let store = FileSessionStore::new(locator);
        store.save(&sample_record()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
