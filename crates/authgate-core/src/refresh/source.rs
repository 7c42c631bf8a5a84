use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{error_message, RefreshError};
use crate::gateway::normalize::{decode_error_body, normalize, NormalizedResponse};
use crate::gateway::{OutboundRequest, Transport};
use crate::store::AccessToken;

/// Field names the refresh endpoint may use for the new token
const TOKEN_FIELDS: [&str; 2] = ["access_token", "accessToken"];

/// Obtains a new access token. Called at most once per refresh cycle by
/// [`RefreshCoordinator`](super::RefreshCoordinator); never retried.
#[async_trait]
pub trait RefreshSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, RefreshError>;
}

/// Calls the refresh endpoint, which reads the refresh credential from the
/// cookie the server set at login.
///
/// The request carries the skip-retry marker so an unauthorized answer is
/// final and cannot start another refresh.
#[derive(Clone)]
pub struct HttpRefreshSource {
    transport: Arc<dyn Transport>,
    path: String,
}

impl HttpRefreshSource {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }

    fn request(&self) -> OutboundRequest {
        OutboundRequest::get(self.path.clone()).skip_retry()
    }
}

#[async_trait]
impl RefreshSource for HttpRefreshSource {
    async fn fetch_token(&self) -> Result<AccessToken, RefreshError> {
        let response = self
            .transport
            .execute(&self.request())
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        if !response.status.is_success() {
            let body = decode_error_body(&response.body);
            return Err(RefreshError::Rejected {
                status: response.status,
                message: error_message(body.as_ref(), &response.body),
            });
        }

        let envelope = normalize(response.status, &response.body)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        let token = extract_token(&envelope).ok_or(RefreshError::MissingToken)?;
        debug!(path = %self.path, "Refresh endpoint issued a new access token");
        Ok(token)
    }
}

/// Token from `data.<field>` or a top-level `<field>`
fn extract_token(envelope: &NormalizedResponse) -> Option<AccessToken> {
    envelope
        .data()
        .and_then(Value::as_object)
        .and_then(token_in)
        .or_else(|| token_in(envelope.body()))
}

fn token_in(scope: &Map<String, Value>) -> Option<AccessToken> {
    TOKEN_FIELDS
        .iter()
        .filter_map(|f| scope.get(*f))
        .filter_map(Value::as_str)
        .find(|t| !t.is_empty())
        .map(AccessToken::new)
}
