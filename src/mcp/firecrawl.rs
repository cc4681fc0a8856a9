//! Firecrawl API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::FirecrawlConfig;
use crate::error::{FiregateError, Result};

/// The subset of the Firecrawl HTTP API used by the tools.
#[async_trait]
pub trait FirecrawlApi: Send + Sync {
    /// POST a JSON body to an API path such as `/v1/scrape`.
    async fn post(&self, path: &str, body: Value) -> Result<Value>;

    /// GET an API path such as `/v1/crawl/{id}`.
    async fn get(&self, path: &str) -> Result<Value>;
}

/// [`FirecrawlApi`] over HTTPS with bearer authentication.
pub struct HttpFirecrawlApi {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpFirecrawlApi {
    pub fn new(config: &FirecrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("firegate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FiregateError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Value> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        trace!(path = %path, status = status.as_u16(), "Firecrawl response");

        if status.is_success() {
            return response.json::<Value>().await.map_err(transport_error);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(path = %path, status = status.as_u16(), "Firecrawl request failed");
        Err(status_error(status, &body))
    }
}

#[async_trait]
impl FirecrawlApi for HttpFirecrawlApi {
    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let request = self.client.post(self.url(path)).json(&body);
        self.send(request, path).await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let request = self.client.get(self.url(path));
        self.send(request, path).await
    }
}

fn transport_error(e: reqwest::Error) -> FiregateError {
    FiregateError::Upstream {
        status: e.status().map(|s| s.as_u16()),
        retryable: e.is_timeout() || e.is_connect(),
        message: e.to_string(),
    }
}

/// Map a non-success response to an error. 429 and 5xx are retryable.
fn status_error(status: StatusCode, body: &str) -> FiregateError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    FiregateError::Upstream {
        status: Some(status.as_u16()),
        retryable: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        message,
    }
}
