//! Request gateway: the sole path for outbound HTTP calls.
//!
//! This module provides:
//! - `OutboundRequest`: one call plus its `retried` annotation
//! - `Transport` / `ReqwestTransport`: the HTTP primitive
//! - `normalize`: success envelope normalization
//! - `classify`: failure classification for the recovery protocol
//! - `Notifier` / `SessionHook`: user notification and session teardown
//! - `Gateway`: attaches the token, recovers from expiry, ends the session

pub mod classify;
pub mod client;
pub mod hooks;
pub mod normalize;
pub mod request;
pub mod transport;

pub use classify::{FailureClass, PublicRoutes};
pub use client::{Gateway, GatewayBuilder};
pub use hooks::{
    LogSessionHook, Notification, Notifier, SessionHook, Severity, TracingNotifier,
};
pub use normalize::NormalizedResponse;
pub use request::{OutboundRequest, NO_RETRY_HEADER};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
