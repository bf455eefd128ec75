//! Alert inventory error types.

use std::num::ParseIntError;
use std::path::PathBuf;

use nrx_graphql::GraphqlClientError;
use thiserror::Error;

/// Result type for alert inventory operations.
pub type AlertsResult<T> = Result<T, AlertsError>;

/// Alert inventory errors.
#[derive(Debug, Error)]
pub enum AlertsError {
    /// Entity search returned something that is not a usable condition.
    #[error("invalid condition entity {guid}: {reason}")]
    InvalidEntity {
        /// Entity GUID.
        guid: String,
        /// What failed validation.
        reason: String,
    },

    /// A server id was not a decimal integer.
    #[error("invalid {field} {value:?}: {source}")]
    InvalidId {
        /// Which id was being parsed.
        field: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        #[source]
        source: ParseIntError,
    },

    /// Condition whose policy is not in the store.
    #[error("condition {condition_id} references unknown policy {policy_id}")]
    OrphanCondition {
        /// Condition id as sent by the server.
        condition_id: String,
        /// Policy id as sent by the server.
        policy_id: String,
    },

    /// GraphQL client failure.
    #[error(transparent)]
    Graphql(#[from] GraphqlClientError),

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Scraper collaborator failure.
    #[error("scraper error: {0}")]
    Scraper(String),

    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AlertsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Parse a server-stringified id into its integer collation key.
pub fn parse_id(field: &'static str, value: &str) -> AlertsResult<i64> {
    value.parse::<i64>().map_err(|source| AlertsError::InvalidId {
        field,
        value: value.to_string(),
        source,
    })
}
