//! Persistent key-value backends for the credential store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;

/// Storage file name in the data directory
const STORAGE_FILE: &str = "storage.json";

/// Persistent key-value storage used by [`CredentialStore`](super::CredentialStore).
///
/// Writing an empty value removes the key.
pub trait KeyValueStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// False when there is no storage in the current execution context
    fn is_available(&self) -> bool {
        true
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if value.is_empty() {
            values.remove(key);
        } else {
            values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Unavailable
// ============================================================================

/// Stand-in for contexts without persistent storage: reads are always empty
/// and writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl KeyValueStorage for UnavailableStorage {
    fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn is_available(&self) -> bool {
        false
    }
}

// ============================================================================
// JSON file
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    updated_at: DateTime<Utc>,
}

/// Storage persisted as a JSON file, one entry per key.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStorage {
    /// Store at `<dir>/storage.json`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(STORAGE_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Store in the platform local data directory under `app_name`
    /// (`~/.local/share/<app_name>` on Linux)
    pub fn in_data_dir(app_name: &str) -> Result<Self, StorageError> {
        let data_dir = dirs::data_local_dir().ok_or(StorageError::NoLocation)?;
        Ok(Self::new(data_dir.join(app_name)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When `key` was last written, if it is present
    pub fn updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.get(key).map(|v| v.updated_at))
    }

    fn load(&self) -> Result<HashMap<String, StoredValue>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, values: &HashMap<String, StoredValue>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.remove(key).map(|v| v.value))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut values = self.load()?;
        if value.is_empty() {
            if values.remove(key).is_none() {
                return Ok(());
            }
        } else {
            values.insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    updated_at: Utc::now(),
                },
            );
        }
        self.save(&values)?;
        debug!(path = %self.path.display(), key, "Storage file updated");
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Storage in the OS keychain, one entry per key under `service`.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl KeyValueStorage for KeyringStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let entry = Entry::new(&self.service, key)?;
        if value.is_empty() {
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            entry.set_password(value)?;
            Ok(())
        }
    }
}
