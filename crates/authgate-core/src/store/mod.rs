//! Credential storage for the current access token.
//!
//! This module provides:
//! - `AccessToken`: the opaque bearer credential
//! - `CredentialStore`: get/set/clear of the token, the single source of truth
//! - `KeyValueStorage`: the persistent backing store, with file, keychain,
//!   in-memory and "unavailable" implementations
//! - `PersistentCookieJar`: HTTP cookies (the refresh credential) kept in the
//!   same backing store
//!
//! Storage failures never reach callers: an unreadable store reads as empty.

pub mod cookies;
pub mod credentials;
pub mod storage;
pub mod token;

pub use cookies::PersistentCookieJar;
pub use credentials::CredentialStore;
pub use storage::{FileStorage, KeyValueStorage, KeyringStorage, MemoryStorage, UnavailableStorage};
pub use token::AccessToken;
