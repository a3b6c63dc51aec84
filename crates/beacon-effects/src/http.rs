//! `reqwest`-backed HTTP handler
//!
//! Redirects are never followed here: the resolver owns redirect semantics
//! and must see the raw 307 with its `Location` and `Retry-After` headers.

use async_trait::async_trait;
use beacon_core::effects::{HttpEffects, HttpError, HttpMethod, HttpRequest, HttpResponse};
use beacon_core::BeaconError;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Production HTTP handler.
#[derive(Debug, Clone)]
pub struct ReqwestHttpHandler {
    client: reqwest::Client,
}

impl ReqwestHttpHandler {
    /// Create a handler with the default timeout
    pub fn new() -> Result<Self, BeaconError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a handler with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, BeaconError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| BeaconError::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client. The caller is responsible for disabling
    /// redirect following.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

#[async_trait]
impl HttpEffects for ReqwestHttpHandler {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "HTTP request failed");
            HttpError::transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::transport(format!("Failed to read body: {e}")))?
            .to_vec();

        debug!(
            method = request.method.as_str(),
            url = %request.url,
            status,
            "HTTP response received"
        );

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
