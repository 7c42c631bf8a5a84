//! Authenticated HTTP access layer.
//!
//! Every outbound call goes through a [`Gateway`], which attaches the current
//! access token from the [`CredentialStore`], normalizes successful responses
//! and recovers from an expired token by asking the [`RefreshCoordinator`]
//! for a new one. Concurrent authorization failures share a single refresh,
//! each failed request is replayed at most once, and a failed refresh ends
//! the session.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod refresh;
pub mod store;

pub use api::{AuthApi, LoginResponse, UpdateProfileRequest, UserProfile};
pub use config::GatewayConfig;
pub use error::{GatewayError, RefreshError, StorageError, TransportError};
pub use gateway::{
    Gateway, GatewayBuilder, NormalizedResponse, Notification, Notifier, OutboundRequest,
    ReqwestTransport, SessionHook, Severity, TracingNotifier, Transport, TransportResponse,
};
pub use refresh::{HttpRefreshSource, RefreshCoordinator, RefreshSource};
pub use store::{
    AccessToken, CredentialStore, FileStorage, KeyValueStorage, KeyringStorage, MemoryStorage,
    PersistentCookieJar, UnavailableStorage,
};
