//! Collaborator hooks: user notifications and session teardown.

use tracing::{error, info, warn};

/// Title used for every error notification
pub const ERROR_TITLE: &str = "Error";

/// Fixed description for 403 answers
pub const PERMISSION_DENIED_MESSAGE: &str = "Permission denied, please update to MEMBERSHIP";

/// Description for failures that end the session
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired, please sign in again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            title: ERROR_TITLE.to_string(),
            description: description.into(),
            severity: Severity::Error,
        }
    }
}

/// Fire-and-forget sink for user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

impl<F> Notifier for F
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        self(notification)
    }
}

/// Emits notifications as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        match n.severity {
            Severity::Info => info!(title = %n.title, "{}", n.description),
            Severity::Warning => warn!(title = %n.title, "{}", n.description),
            Severity::Error => error!(title = %n.title, "{}", n.description),
        }
    }
}

/// Invoked when the session ends on an unrecoverable authorization failure,
/// e.g. to send the user back to sign-in.
pub trait SessionHook: Send + Sync {
    fn session_ended(&self);
}

impl<F> SessionHook for F
where
    F: Fn() + Send + Sync,
{
    fn session_ended(&self) {
        self()
    }
}

/// Session hook that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSessionHook;

impl SessionHook for LogSessionHook {
    fn session_ended(&self) {
        warn!("Session ended; sign-in required");
    }
}
