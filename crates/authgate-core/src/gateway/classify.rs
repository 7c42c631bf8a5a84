//! Failure classification for the recovery protocol.

use reqwest::StatusCode;

use super::request::OutboundRequest;

/// Route fragments exempt from refresh-and-replay.
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes {
    fragments: Vec<String>,
}

impl PublicRoutes {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(Into::into)
                .filter(|f: &String| !f.is_empty())
                .collect(),
        }
    }

    /// True if any fragment occurs anywhere in `path`
    pub fn matches(&self, path: &str) -> bool {
        self.fragments.iter().any(|f| path.contains(f.as_str()))
    }
}

/// What the gateway does with a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Public route: notify and surface, never refresh
    PublicRoute,
    /// 403: fixed notification, no retry
    PermissionDenied,
    /// Any other 4xx (400 included): notify and surface, no side effects
    Client,
    /// First 401 on a request that may still be replayed
    Recoverable,
    /// 401 that cannot be recovered: ends the session
    Terminal,
    /// 5xx or other non-success status
    Server,
    /// No answer from the server
    Transport,
}

/// Classify a failure. `status` is `None` when the server never answered.
///
/// Rules apply in priority order: public route, forbidden, unauthorized
/// (recoverable only once and only without the skip-retry marker), other
/// client errors, everything else.
pub fn classify(request: &OutboundRequest, status: Option<StatusCode>, public: bool) -> FailureClass {
    if public {
        return FailureClass::PublicRoute;
    }
    let Some(status) = status else {
        return FailureClass::Transport;
    };
    match status {
        StatusCode::FORBIDDEN => FailureClass::PermissionDenied,
        StatusCode::UNAUTHORIZED => {
            if request.is_retried() || request.is_skip_retry() {
                FailureClass::Terminal
            } else {
                FailureClass::Recoverable
            }
        }
        s if s.is_client_error() => FailureClass::Client,
        _ => FailureClass::Server,
    }
}
