//! Network transport used for publisher lookups and prefix list downloads.
//!
//! Retry and backoff belong to the transport, not to the coordinator.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Response to a GET request.
#[derive(Debug, Clone, Default)]
pub struct UrlResponse {
    /// Requested URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Bytes,
    /// Response headers, lower-cased names.
    pub headers: BTreeMap<String, String>,
}

impl UrlResponse {
    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of the verifier.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure. Non-2xx statuses are returned
    /// as responses, not errors.
    async fn get(&self, url: &str) -> Result<UrlResponse>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("publisher-verifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<UrlResponse> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(format!("GET {url} failed: {e}")))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Reading body of {url} failed: {e}")))?;

        debug!("GET {url} -> {status} ({} bytes)", body.len());
        Ok(UrlResponse {
            url: url.to_string(),
            status,
            body,
            headers,
        })
    }
}
