use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::CookieStore;
use reqwest::{header, Client, ClientBuilder, StatusCode};
use tracing::debug;

use super::request::OutboundRequest;
use crate::config::GatewayConfig;
use crate::error::TransportError;

/// Raw answer from the server before classification or normalization.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

/// The HTTP primitive the gateway and refresh source send through.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] over a shared `reqwest` client.
///
/// Default headers and the cookie store are fixed at construction; the cookie
/// store carries the server-issued refresh credential between calls.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Transport keeping cookies in `cookies`, e.g. a
    /// [`PersistentCookieJar`](crate::store::PersistentCookieJar)
    pub fn with_cookies<C: CookieStore + 'static>(
        config: &GatewayConfig,
        cookies: Arc<C>,
    ) -> Result<Self, TransportError> {
        let client = client_builder(config).cookie_provider(cookies).build()?;
        Ok(Self {
            client,
            base_url: config.api_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

fn client_builder(config: &GatewayConfig) -> ClientBuilder {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    Client::builder()
        .timeout(config.timeout())
        .default_headers(headers)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(request.path());
        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(method = %request.method(), url = %url, status = status.as_u16(), "Response received");

        Ok(TransportResponse { status, body })
    }
}
