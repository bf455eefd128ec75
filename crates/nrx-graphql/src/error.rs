//! Error types for the GraphQL client.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP error information captured from reqwest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    /// Error message.
    pub message: String,
    /// HTTP status code (if available).
    pub status_code: Option<u16>,
    /// Whether the error was a timeout.
    pub is_timeout: bool,
    /// Whether the error was a connection failure.
    pub is_connect: bool,
}

impl From<reqwest::Error> for HttpErrorInfo {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status_code: err.status().map(|status| status.as_u16()),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
        }
    }
}

impl HttpErrorInfo {
    /// Short failure class used in messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        if self.is_timeout {
            "timeout"
        } else if self.is_connect {
            "connect"
        } else {
            "transport"
        }
    }
}

/// GraphQL error as reported in the top-level `errors` array.
///
/// Only `message` is interpreted; everything else the server sends is kept
/// in `extensions` for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Path within the response where the error occurred.
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
    /// Extensions metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

/// Error type for GraphQL client operations.
#[derive(Debug, Clone, Error)]
pub enum GraphqlClientError {
    /// HTTP/network error; no response was received.
    #[error("HTTP {} error: {}", .0.kind(), .0.message)]
    Http(HttpErrorInfo),

    /// HTTP response with a status other than 200 or 202.
    #[error("HTTP status {status} with body: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: StatusCode,
        /// Response body (truncated if needed).
        body: String,
    },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(String),

    /// GraphQL-level errors returned by the server.
    #[error("GraphQL errors: {}", summarize(.errors))]
    GraphqlErrors {
        /// GraphQL error list.
        errors: Vec<GraphqlError>,
    },

    /// GraphQL protocol violation, such as a response without `data`.
    #[error("GraphQL protocol error: {message}")]
    Protocol {
        /// Details.
        message: String,
    },

    /// Every attempt failed without ever receiving a response.
    #[error("no response after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempt count.
        attempts: usize,
        /// Message of the last transport failure.
        last: String,
    },
}

fn summarize(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|err| err.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<reqwest::Error> for GraphqlClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(HttpErrorInfo::from(err))
    }
}

impl From<serde_json::Error> for GraphqlClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl GraphqlClientError {
    /// Returns `true` if another attempt may succeed.
    ///
    /// Any transport failure or non-success status is retried; decode and
    /// GraphQL-level errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::HttpStatus { .. })
    }

    /// Returns `true` if the first GraphQL error carries exactly `message`.
    #[must_use]
    pub fn first_message_is(&self, message: &str) -> bool {
        match self {
            Self::GraphqlErrors { errors } => errors
                .first()
                .is_some_and(|err| err.message == message),
            _ => false,
        }
    }
}
