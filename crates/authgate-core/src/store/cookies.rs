use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::KeyValueStorage;

/// Default storage key for saved cookies
pub const DEFAULT_COOKIE_KEY: &str = "COOKIES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SavedCookie {
    url: String,
    set_cookie: String,
}

/// HTTP cookie store whose contents outlive the process.
///
/// Matching and expiry are handled by a `reqwest` [`Jar`]. Every `Set-Cookie`
/// the server sends is also recorded in [`KeyValueStorage`] and replayed into
/// the jar on load, so the refresh cookie issued at login is still sent by a
/// later process sharing the same storage.
pub struct PersistentCookieJar {
    jar: Jar,
    // Latest Set-Cookie per host and cookie name
    saved: Mutex<BTreeMap<String, SavedCookie>>,
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl PersistentCookieJar {
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::load_with_key(storage, DEFAULT_COOKIE_KEY)
    }

    pub fn load_with_key(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let saved = read_saved(storage.as_ref(), &key);

        let jar = Jar::default();
        for cookie in saved.values() {
            match Url::parse(&cookie.url) {
                Ok(url) => jar.add_cookie_str(&cookie.set_cookie, &url),
                Err(e) => warn!(url = %cookie.url, error = %e, "Skipping saved cookie with bad URL"),
            }
        }
        debug!(key = %key, count = saved.len(), "Loaded saved cookies");

        Self {
            jar,
            saved: Mutex::new(saved),
            storage,
            key,
        }
    }

    /// Number of cookies recorded in storage
    pub fn saved_count(&self) -> usize {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn persist(&self, saved: &BTreeMap<String, SavedCookie>) {
        let raw = match serde_json::to_string(saved) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to encode cookies");
                return;
            }
        };
        if let Err(e) = self.storage.write(&self.key, &raw) {
            warn!(key = %self.key, error = %e, "Failed to save cookies");
        }
    }
}

impl CookieStore for PersistentCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<HeaderValue> = cookie_headers.cloned().collect();
        if headers.is_empty() {
            return;
        }
        self.jar.set_cookies(&mut headers.iter(), url);

        let mut saved = self.saved.lock().unwrap_or_else(|e| e.into_inner());
        for raw in headers.iter().filter_map(|h| h.to_str().ok()) {
            let Some(name) = cookie_name(raw) else {
                continue;
            };
            let entry = format!("{} {}", url.host_str().unwrap_or_default(), name);
            saved.insert(
                entry,
                SavedCookie {
                    url: url.to_string(),
                    set_cookie: raw.to_string(),
                },
            );
        }
        self.persist(&saved);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}

impl fmt::Debug for PersistentCookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentCookieJar")
            .field("key", &self.key)
            .field("saved", &self.saved_count())
            .finish()
    }
}

fn read_saved(storage: &dyn KeyValueStorage, key: &str) -> BTreeMap<String, SavedCookie> {
    match storage.read(key) {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "Ignoring unreadable saved cookies");
            BTreeMap::new()
        }),
        Ok(None) => BTreeMap::new(),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to read saved cookies");
            BTreeMap::new()
        }
    }
}

fn cookie_name(set_cookie: &str) -> Option<&str> {
    let (name, _) = set_cookie.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}
