//! Request and response envelopes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{GraphqlClientError, GraphqlError};

/// GraphQL query wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphqlQuery {
    query: String,
}

impl GraphqlQuery {
    /// Create a new query from a string.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    /// Return the query text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.query
    }
}

/// GraphQL request payload, serialized as `{ "query": ..., "variables": ... }`.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest<V> {
    /// Query text.
    pub query: GraphqlQuery,
    /// Variables.
    pub variables: V,
}

impl<V: Serialize> GraphqlRequest<V> {
    /// Create a new request.
    #[must_use]
    pub const fn new(query: GraphqlQuery, variables: V) -> Self {
        Self { query, variables }
    }

    /// Encode the request body.
    pub fn to_body(&self) -> Result<serde_json::Value, GraphqlClientError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// GraphQL response container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphqlResponse<T> {
    /// Response data.
    #[serde(default)]
    pub data: Option<T>,
    /// GraphQL errors.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<GraphqlError>,
}

impl<T> GraphqlResponse<T> {
    /// Data only; any GraphQL error or missing data is an error.
    pub fn into_data(self) -> Result<T, GraphqlClientError> {
        if !self.errors.is_empty() {
            return Err(GraphqlClientError::GraphqlErrors {
                errors: self.errors,
            });
        }
        self.data.ok_or_else(|| GraphqlClientError::Protocol {
            message: "missing GraphQL data".to_string(),
        })
    }
}

/// Deserialize `null` as `T::default()`.
///
/// Pair with `#[serde(default)]` so a missing key decodes the same way.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
