//! Error types for the access layer.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Description used when the server gives no usable message.
pub const DEFAULT_ERROR_MESSAGE: &str = "Server error please try again";

/// Errors surfaced to callers of [`Gateway::send`](crate::Gateway::send).
///
/// Every variant reaching a caller has already produced exactly one user
/// notification. `body` holds the server's decoded error payload, if any.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request to public route failed: {message}")]
    PublicRoute {
        status: Option<StatusCode>,
        message: String,
        body: Option<Value>,
    },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String, body: Option<Value> },

    #[error("Client error ({status}): {message}")]
    Client {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },

    #[error("Unauthorized - session ended: {message}")]
    Unauthorized { message: String, body: Option<Value> },

    #[error("Token refresh failed after unauthorized response ({message}): {source}")]
    RefreshFailed {
        message: String,
        #[source]
        source: RefreshError,
    },

    #[error("Server error ({status}): {message}")]
    Server {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },

    #[error("Network error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// HTTP status that caused the error, when the server answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GatewayError::PublicRoute { status, .. } => *status,
            GatewayError::PermissionDenied { .. } => Some(StatusCode::FORBIDDEN),
            GatewayError::Client { status, .. } | GatewayError::Server { status, .. } => {
                Some(*status)
            }
            GatewayError::Unauthorized { .. } | GatewayError::RefreshFailed { .. } => {
                Some(StatusCode::UNAUTHORIZED)
            }
            _ => None,
        }
    }

    /// Whether this error ended the session (credentials cleared, sign-in required)
    pub fn ended_session(&self) -> bool {
        matches!(
            self,
            GatewayError::Unauthorized { .. } | GatewayError::RefreshFailed { .. }
        )
    }

    /// Server-provided error payload, if one was decoded
    pub fn body(&self) -> Option<&Value> {
        match self {
            GatewayError::PublicRoute { body, .. }
            | GatewayError::PermissionDenied { body, .. }
            | GatewayError::Client { body, .. }
            | GatewayError::Unauthorized { body, .. }
            | GatewayError::Server { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}

/// Outcome of a failed refresh. Cloned to every caller attached to the
/// same in-flight refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh rejected by server ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Refresh response carried no access token")]
    MissingToken,

    #[error("Network error during refresh: {0}")]
    Transport(String),

    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),

    #[error("Refresh did not complete in time and was cancelled")]
    Cancelled,
}

/// Failure to reach the server or read its answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Failure of the persistent key-value collaborator.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("No storage location available")]
    NoLocation,
}

/// Truncate a response body to avoid logging excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

/// Pull the human-readable message out of a server error body.
///
/// The server answers errors with `{"message": "...", "errors": {...}}`;
/// anything else falls back to the truncated raw body or the default text.
pub(crate) fn error_message(body: Option<&Value>, raw: &str) -> String {
    if let Some(message) = body
        .and_then(|b| b.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
    {
        return message.to_string();
    }
    if body.is_none() && !raw.trim().is_empty() {
        return truncate_body(raw.trim());
    }
    DEFAULT_ERROR_MESSAGE.to_string()
}
