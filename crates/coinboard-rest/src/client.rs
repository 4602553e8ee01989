//! HTTP client for market data endpoints.

use crate::error::{RestError, RestResult};
use crate::fetcher::{BoxFuture, Fetcher};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in [`RestError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// JSON-over-GET client.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
}

impl RestClient {
    /// Create a client with the default timeout.
    pub fn new() -> RestResult<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("coinboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RestError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// Non-2xx responses become [`RestError::Status`] carrying the code.
    pub async fn get_json(&self, url: &str) -> RestResult<serde_json::Value> {
        debug!(%url, "GET");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RestError::Timeout
            } else {
                RestError::HttpClient(format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RestError::Decode(format!("Failed to parse response: {e}")))
    }
}

impl Fetcher for RestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, RestResult<serde_json::Value>> {
        Box::pin(self.get_json(url))
    }
}
