//! GraphQL HTTP client implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::error::GraphqlClientError;
use crate::operation::{GraphqlRequest, GraphqlResponse};
use crate::retry::{RetryDecision, RetryPolicy};

/// Default New Relic NerdGraph endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.newrelic.com/graphql";

/// Header carrying the user API key.
pub const API_KEY_HEADER: &str = "API-Key";

/// GraphQL client metrics.
#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
pub struct GraphqlClientMetrics {
    requests_total: AtomicU64,
    requests_success: AtomicU64,
    requests_error: AtomicU64,
    requests_retried: AtomicU64,
}

impl GraphqlClientMetrics {
    /// Snapshot current metrics.
    #[must_use]
    pub fn snapshot(&self) -> GraphqlClientMetricsSnapshot {
        GraphqlClientMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_error: self.requests_error.load(Ordering::Relaxed),
            requests_retried: self.requests_retried.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_field_names)]
pub struct GraphqlClientMetricsSnapshot {
    /// Logical requests issued (retries not counted).
    pub requests_total: u64,
    /// Requests that decoded without GraphQL errors.
    pub requests_success: u64,
    /// Requests that failed at any layer.
    pub requests_error: u64,
    /// Retries performed.
    pub requests_retried: u64,
}

/// GraphQL client configuration.
#[derive(Debug, Clone)]
pub struct GraphqlClientConfig {
    /// Default headers applied to every request.
    pub headers: HeaderMap,
    /// Request timeout; `None` keeps the transport default.
    pub timeout: Option<Duration>,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl Default for GraphqlClientConfig {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            headers,
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// GraphQL client builder.
///
/// Cheap to clone; each clone builds an independent client with its own
/// connection pool.
#[derive(Debug, Clone)]
pub struct GraphqlClientBuilder {
    endpoint: String,
    config: GraphqlClientConfig,
}

impl GraphqlClientBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config: GraphqlClientConfig::default(),
        }
    }

    /// Set the `API-Key` header.
    pub fn with_api_key(mut self, key: impl AsRef<str>) -> Result<Self, GraphqlClientError> {
        let mut value =
            HeaderValue::from_str(key.as_ref()).map_err(|err| GraphqlClientError::Protocol {
                message: format!("invalid API key header value: {err}"),
            })?;
        value.set_sensitive(true);
        self.config
            .headers
            .insert(HeaderName::from_static("api-key"), value);
        Ok(self)
    }

    /// Set timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Set retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<GraphqlClient, GraphqlClientError> {
        GraphqlClient::with_config(self.endpoint, self.config)
    }
}

/// GraphQL client with fixed-delay retry.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    http: reqwest::Client,
    config: GraphqlClientConfig,
    metrics: Arc<GraphqlClientMetrics>,
}

impl GraphqlClient {
    /// Create a client with custom configuration.
    pub fn with_config(
        endpoint: impl Into<String>,
        config: GraphqlClientConfig,
    ) -> Result<Self, GraphqlClientError> {
        let mut builder = reqwest::Client::builder().default_headers(config.headers.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            http,
            config,
            metrics: Arc::new(GraphqlClientMetrics::default()),
        })
    }

    /// Return client metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> GraphqlClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Execute a request and decode the response envelope.
    ///
    /// GraphQL-level errors are returned inside the envelope, not as `Err`.
    pub async fn execute<V, R>(
        &self,
        request: &GraphqlRequest<V>,
    ) -> Result<GraphqlResponse<R>, GraphqlClientError>
    where
        V: Serialize,
        R: DeserializeOwned,
    {
        let body = request.to_body()?;
        let bytes = self.post(&body).await?;
        let response: GraphqlResponse<R> = match serde_json::from_slice(&bytes) {
            Ok(response) => response,
            Err(err) => {
                self.metrics.requests_error.fetch_add(1, Ordering::Relaxed);
                return Err(err.into());
            }
        };

        if response.errors.is_empty() {
            self.metrics
                .requests_success
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.requests_error.fetch_add(1, Ordering::Relaxed);
        }

        Ok(response)
    }

    /// POST a JSON body with up to `max_attempts` attempts.
    ///
    /// An attempt succeeds on status 200 or 202. When the final attempt still
    /// received a response, its body is returned whatever the status; only
    /// when no response was received at all is an error returned.
    pub async fn post(&self, body: &serde_json::Value) -> Result<Vec<u8>, GraphqlClientError> {
        let body_bytes = serde_json::to_vec(body)?;
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

        let mut attempt = 1;
        loop {
            let (err, last_body) = match self.send_once(&body_bytes).await {
                Ok((status, bytes)) if is_accepted(status) => {
                    debug!(attempt, bytes = bytes.len(), "GraphQL response received");
                    return Ok(bytes);
                }
                Ok((status, bytes)) => {
                    let err = GraphqlClientError::HttpStatus {
                        status,
                        body: truncate_body(&bytes),
                    };
                    (err, Some(bytes))
                }
                Err(err) => (err, None),
            };

            match self.config.retry.decide(&err, attempt) {
                RetryDecision::RetryAfter(delay) => {
                    self.metrics
                        .requests_retried
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(attempt, error = %err, "retrying GraphQL request after {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::DoNotRetry => {
                    error!(attempt, error = %err, "GraphQL request failed");
                    return match last_body {
                        Some(bytes) => Ok(bytes),
                        None => {
                            self.metrics.requests_error.fetch_add(1, Ordering::Relaxed);
                            Err(GraphqlClientError::RetriesExhausted {
                                attempts: attempt,
                                last: err.to_string(),
                            })
                        }
                    };
                }
            }
        }
    }

    async fn send_once(
        &self,
        body_bytes: &[u8],
    ) -> Result<(StatusCode, Vec<u8>), GraphqlClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .body(body_bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                warn!(%status, error = %err, "failed to read GraphQL response body");
                Vec::new()
            }
        };
        Ok((status, bytes))
    }
}

const fn is_accepted(status: StatusCode) -> bool {
    matches!(status, StatusCode::OK | StatusCode::ACCEPTED)
}

fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}
