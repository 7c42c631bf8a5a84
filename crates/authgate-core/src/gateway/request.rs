use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;

use crate::error::GatewayError;
use crate::store::AccessToken;

/// Header marking a request as exempt from the refresh-and-replay protocol.
/// The refresh call carries it so an unauthorized refresh cannot recurse.
pub const NO_RETRY_HEADER: &str = "x-no-retry";

/// Description of one HTTP call plus its `retried` annotation.
///
/// The request itself is never mutated by the gateway; a replay is a new
/// value produced by [`into_retry`](Self::into_retry), so annotation state
/// cannot leak between logically distinct calls.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: HeaderMap,
    retried: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Exempt this request from refresh-and-replay on an unauthorized answer
    pub fn skip_retry(self) -> Self {
        self.header(
            HeaderName::from_static(NO_RETRY_HEADER),
            HeaderValue::from_static("true"),
        )
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn is_skip_retry(&self) -> bool {
        self.headers.contains_key(NO_RETRY_HEADER)
    }

    /// The replay of this request: same call, `retried` set
    pub(crate) fn into_retry(mut self) -> Self {
        self.retried = true;
        self
    }

    /// Copy of this request carrying `token` as its bearer credential.
    /// Without a token any `Authorization` header is dropped.
    pub(crate) fn with_bearer(&self, token: Option<&AccessToken>) -> Result<Self, GatewayError> {
        let mut request = self.clone();
        match token {
            Some(token) => {
                let mut value = HeaderValue::from_str(&token.bearer()).map_err(|_| {
                    GatewayError::InvalidRequest(
                        "access token contains characters not allowed in a header".to_string(),
                    )
                })?;
                value.set_sensitive(true);
                request.headers.insert(header::AUTHORIZATION, value);
            }
            None => {
                request.headers.remove(header::AUTHORIZATION);
            }
        }
        Ok(request)
    }
}
