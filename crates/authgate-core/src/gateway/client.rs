//! The request gateway every outbound call passes through.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::classify::{classify, FailureClass, PublicRoutes};
use super::hooks::{
    LogSessionHook, Notification, Notifier, SessionHook, TracingNotifier,
    PERMISSION_DENIED_MESSAGE, SESSION_EXPIRED_MESSAGE,
};
use super::normalize::{decode_error_body, normalize, NormalizedResponse};
use super::request::OutboundRequest;
use super::transport::{ReqwestTransport, Transport};
use crate::config::GatewayConfig;
use crate::error::{error_message, GatewayError, TransportError};
use crate::refresh::{HttpRefreshSource, RefreshCoordinator, RefreshSource};
use crate::store::{
    AccessToken, CredentialStore, KeyValueStorage, MemoryStorage, PersistentCookieJar,
};

/// A call that did not produce a normalized response
#[derive(Debug)]
enum Failure {
    Status {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },
    Transport(TransportError),
}

impl Failure {
    fn status(&self) -> Option<StatusCode> {
        match self {
            Failure::Status { status, .. } => Some(*status),
            Failure::Transport(_) => None,
        }
    }

    fn message(&self) -> String {
        match self {
            Failure::Status { message, .. } => message.clone(),
            Failure::Transport(e) => e.to_string(),
        }
    }
}

/// Authenticated HTTP client. Clone is cheap; clones share all state.
///
/// Construct once per session with [`Gateway::builder`] and hand clones to
/// whatever issues requests.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    coordinator: RefreshCoordinator,
    public_routes: PublicRoutes,
    notifier: Arc<dyn Notifier>,
    session_hook: Arc<dyn SessionHook>,
    // Latest refresh cycle whose terminal failure already ran the session hook
    navigated_cycle: AtomicU64,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Send `request`, recovering once from an expired access token.
    ///
    /// A first unauthorized answer triggers a (shared) token refresh and one
    /// replay with the new token. Every error returned here has produced
    /// exactly one notification; a silent recovery produces none.
    pub async fn send(&self, request: OutboundRequest) -> Result<NormalizedResponse, GatewayError> {
        let token = self.inner.store.get();
        let failure = match self.dispatch(&request, token.as_ref()).await? {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };

        match self.classify(&request, &failure) {
            FailureClass::Recoverable => self.recover(request, failure).await,
            class => Err(self.reject(&request, class, failure, None)),
        }
    }

    pub async fn get(&self, path: &str) -> Result<NormalizedResponse, GatewayError> {
        self.send(OutboundRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<NormalizedResponse, GatewayError> {
        self.send(OutboundRequest::post(path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<NormalizedResponse, GatewayError> {
        self.send(OutboundRequest::put(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<NormalizedResponse, GatewayError> {
        self.send(OutboundRequest::delete(path)).await
    }

    pub fn get_token(&self) -> Option<AccessToken> {
        self.inner.store.get()
    }

    /// Seed the store, e.g. after login
    pub fn set_token(&self, token: &AccessToken) {
        self.inner.store.set(token);
    }

    /// Explicit sign-out. Does not invoke the session hook.
    pub fn clear_token(&self) {
        self.inner.store.clear();
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// One attempt: attach `token`, send, normalize.
    /// The outer error is for requests that could not be sent at all.
    async fn dispatch(
        &self,
        request: &OutboundRequest,
        token: Option<&AccessToken>,
    ) -> Result<Result<NormalizedResponse, Failure>, GatewayError> {
        let request = match request.with_bearer(token) {
            Ok(request) => request,
            Err(e) => {
                self.notify(Notification::error(e.to_string()));
                return Err(e);
            }
        };

        let response = match self.inner.transport.execute(&request).await {
            Ok(response) => response,
            Err(e) => return Ok(Err(Failure::Transport(e))),
        };

        if response.status.is_success() {
            return match normalize(response.status, &response.body) {
                Ok(normalized) => Ok(Ok(normalized)),
                Err(e) => {
                    warn!(path = %request.path(), error = %e, "Undecodable response body");
                    self.notify(Notification::error(e.to_string()));
                    Err(e)
                }
            };
        }

        let body = decode_error_body(&response.body);
        let message = error_message(body.as_ref(), &response.body);
        debug!(
            method = %request.method(),
            path = %request.path(),
            status = response.status.as_u16(),
            retried = request.is_retried(),
            "Request failed"
        );
        Ok(Err(Failure::Status {
            status: response.status,
            message,
            body,
        }))
    }

    fn classify(&self, request: &OutboundRequest, failure: &Failure) -> FailureClass {
        let public = self.inner.public_routes.matches(request.path());
        classify(request, failure.status(), public)
    }

    /// Refresh the token once and replay `request` with it.
    async fn recover(
        &self,
        request: OutboundRequest,
        failure: Failure,
    ) -> Result<NormalizedResponse, GatewayError> {
        let replay = request.into_retry();
        debug!(path = %replay.path(), "Unauthorized; refreshing access token");

        let (cycle, outcome) = self.inner.coordinator.refresh_in_cycle().await;
        let token = match outcome {
            Ok(token) => token,
            Err(source) => {
                self.end_session(Some(cycle));
                self.notify(Notification::error(SESSION_EXPIRED_MESSAGE));
                return Err(GatewayError::RefreshFailed {
                    message: failure.message(),
                    source,
                });
            }
        };
        self.set_token(&token);

        match self.dispatch(&replay, Some(&token)).await? {
            Ok(response) => {
                info!(path = %replay.path(), "Request succeeded after token refresh");
                Ok(response)
            }
            Err(failure) => {
                let class = self.classify(&replay, &failure);
                Err(self.reject(&replay, class, failure, Some(cycle)))
            }
        }
    }

    /// Side effects and error for a failure that will not be recovered.
    /// `cycle` is the refresh the request already went through, if any.
    fn reject(
        &self,
        request: &OutboundRequest,
        class: FailureClass,
        failure: Failure,
        cycle: Option<u64>,
    ) -> GatewayError {
        let error = match (class, failure) {
            (FailureClass::Recoverable | FailureClass::Terminal, failure) => {
                warn!(path = %request.path(), retried = request.is_retried(), "Unauthorized; ending session");
                self.end_session(cycle);
                self.notify(Notification::error(SESSION_EXPIRED_MESSAGE));
                let (message, body) = match failure {
                    Failure::Status { message, body, .. } => (message, body),
                    Failure::Transport(e) => (e.to_string(), None),
                };
                return GatewayError::Unauthorized { message, body };
            }
            (FailureClass::PublicRoute, Failure::Status { status, message, body }) => {
                GatewayError::PublicRoute {
                    status: Some(status),
                    message,
                    body,
                }
            }
            (FailureClass::PublicRoute, Failure::Transport(e)) => GatewayError::PublicRoute {
                status: None,
                message: e.to_string(),
                body: None,
            },
            (FailureClass::PermissionDenied, failure) => {
                self.notify(Notification::error(PERMISSION_DENIED_MESSAGE));
                return GatewayError::PermissionDenied {
                    message: failure.message(),
                    body: status_body(failure),
                };
            }
            (FailureClass::Client, Failure::Status { status, message, body }) => {
                GatewayError::Client { status, message, body }
            }
            (
                FailureClass::Server | FailureClass::Transport,
                Failure::Status { status, message, body },
            ) => {
                GatewayError::Server { status, message, body }
            }
            (_, Failure::Transport(e)) => GatewayError::Transport(e),
        };

        let description = match &error {
            GatewayError::PublicRoute { message, .. }
            | GatewayError::Client { message, .. }
            | GatewayError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        };
        self.notify(Notification::error(description));
        error
    }

    /// Clear credentials and run the session hook.
    ///
    /// Requests failing from the same refresh cycle run the hook once between
    /// them; a failure outside any cycle always runs it.
    fn end_session(&self, cycle: Option<u64>) {
        self.inner.store.clear();
        let first = match cycle {
            Some(cycle) => self.inner.navigated_cycle.fetch_max(cycle, Ordering::SeqCst) < cycle,
            None => true,
        };
        if first {
            warn!(cycle, "Session ended after unrecoverable authorization failure");
            self.inner.session_hook.session_ended();
        }
    }

    fn notify(&self, notification: Notification) {
        self.inner.notifier.notify(notification);
    }
}

fn status_body(failure: Failure) -> Option<Value> {
    match failure {
        Failure::Status { body, .. } => body,
        Failure::Transport(_) => None,
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("store", &self.inner.store)
            .field("coordinator", &self.inner.coordinator)
            .field("public_routes", &self.inner.public_routes)
            .field("navigated_cycle", &self.inner.navigated_cycle.load(Ordering::SeqCst))
            .finish()
    }
}

/// Builder for [`Gateway`]. Anything not supplied falls back to the
/// `reqwest` transport, in-memory storage, tracing notifications and a
/// logging session hook. The default transport keeps its cookies in the
/// same storage as the access token.
pub struct GatewayBuilder {
    config: GatewayConfig,
    storage: Option<Arc<dyn KeyValueStorage>>,
    transport: Option<Arc<dyn Transport>>,
    refresh_source: Option<Arc<dyn RefreshSource>>,
    notifier: Option<Arc<dyn Notifier>>,
    session_hook: Option<Arc<dyn SessionHook>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            storage: None,
            transport: None,
            refresh_source: None,
            notifier: None,
            session_hook: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn refresh_source(mut self, source: Arc<dyn RefreshSource>) -> Self {
        self.refresh_source = Some(source);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn session_hook(mut self, hook: Arc<dyn SessionHook>) -> Self {
        self.session_hook = Some(hook);
        self
    }

    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let cookies = PersistentCookieJar::load(Arc::clone(&storage));
                Arc::new(ReqwestTransport::with_cookies(&config, Arc::new(cookies))?)
            }
        };
        let refresh_source = self.refresh_source.unwrap_or_else(|| {
            Arc::new(HttpRefreshSource::new(
                Arc::clone(&transport),
                config.refresh_path.clone(),
            ))
        });
        let store = CredentialStore::with_key(storage, config.token_key.clone());

        debug!(
            api_url = %config.api_url(),
            has_token = store.has_token(),
            "Gateway constructed"
        );

        Ok(Gateway {
            inner: Arc::new(Inner {
                transport,
                store,
                coordinator: RefreshCoordinator::new(refresh_source)
                    .with_timeout(config.refresh_timeout()),
                public_routes: PublicRoutes::new(config.public_routes.iter().cloned()),
                notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
                session_hook: self.session_hook.unwrap_or_else(|| Arc::new(LogSessionHook)),
                navigated_cycle: AtomicU64::new(0),
            }),
        })
    }
}
