use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use super::storage::KeyValueStorage;
use super::token::AccessToken;

/// Default storage key for the access token
pub const DEFAULT_TOKEN_KEY: &str = "ACCESS_TOKEN";

/// Storage key for the signed-in user's profile, kept next to the token
pub const USER_DATA_KEY: &str = "USER_DATA";

/// Holds the current access token and the cached profile of the user it
/// belongs to. Clone is cheap and clones share storage.
///
/// Writes are plain overwrites (last writer wins). Storage errors are logged
/// and swallowed: reads come back empty, `set`/`clear` become no-ops.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::with_key(storage, DEFAULT_TOKEN_KEY)
    }

    pub fn with_key(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Current token, or `None` if unset, empty, or storage is unavailable
    pub fn get(&self) -> Option<AccessToken> {
        self.read(&self.key).map(AccessToken::new)
    }

    /// Overwrite the stored token
    pub fn set(&self, token: &AccessToken) {
        self.write(&self.key, token.as_str());
    }

    /// Equivalent to setting an empty token. Idempotent.
    pub fn clear(&self) {
        self.write(&self.key, "");
    }

    pub fn has_token(&self) -> bool {
        self.get().is_some()
    }

    /// Serialized profile stored at login
    pub fn user_data(&self) -> Option<String> {
        self.read(USER_DATA_KEY)
    }

    pub fn set_user_data(&self, data: &str) {
        self.write(USER_DATA_KEY, data);
    }

    pub fn clear_user_data(&self) {
        self.write(USER_DATA_KEY, "");
    }

    fn read(&self, key: &str) -> Option<String> {
        if !self.storage.is_available() {
            return None;
        }
        match self.storage.read(key) {
            Ok(Some(value)) if !value.is_empty() => Some(value),
            Ok(_) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read credential storage, treating as empty");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.write(key, value) {
            warn!(key, error = %e, "Failed to write credential storage");
            return;
        }
        if value.is_empty() {
            debug!(key, "Credential cleared");
        } else {
            debug!(key, "Credential stored");
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("key", &self.key)
            .field("available", &self.storage.is_available())
            .finish()
    }
}
