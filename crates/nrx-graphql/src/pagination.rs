//! Cursor pagination for GraphQL search APIs.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::GraphqlClient;
use crate::operation::{GraphqlQuery, GraphqlRequest};

/// Decoded page data that knows where its `nextCursor` lives.
pub trait CursorPage {
    /// Raw `nextCursor` value, `None` when the field is absent.
    fn next_cursor(&self) -> Option<&serde_json::Value>;
}

/// Variables sent with every page request.
///
/// The first request carries no cursor at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CursorVariables {
    /// Cursor returned by the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Page limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimit {
    /// Maximum number of page requests.
    pub max_pages: usize,
}

impl PageLimit {
    /// Create a new limit.
    #[must_use]
    pub const fn new(max_pages: usize) -> Self {
        Self { max_pages }
    }
}

/// Summary of a pagination run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Pages decoded and handed to the callback.
    pub pages: usize,
    /// Pages dropped because the request or decode failed.
    pub failed_pages: usize,
}

/// Pagination error type.
#[derive(Debug, Error)]
pub enum PaginationError {
    /// Pagination limit exceeded.
    #[error("pagination limit of {limit} pages exceeded")]
    LimitExceeded {
        /// Configured limit.
        limit: usize,
        /// Work done before stopping.
        stats: PageStats,
    },
}

/// Interpret an untyped `nextCursor`.
///
/// Strings pass through; numbers and booleans are stringified; null ends
/// iteration. Objects and arrays are not valid cursors.
#[must_use]
pub fn cursor_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => None,
        other => {
            warn!(cursor = %other, "ignoring non-scalar nextCursor");
            None
        }
    }
}

/// Drive a cursor loop until the server reports no next cursor.
///
/// Server-reported `errors` are logged and the page's data is still used. A
/// failed request or undecodable page is logged and ends iteration, since no
/// cursor could be read from it.
pub async fn paginate_cursor<P, F>(
    client: &GraphqlClient,
    query: &GraphqlQuery,
    limit: Option<PageLimit>,
    mut on_page: F,
) -> Result<PageStats, PaginationError>
where
    P: DeserializeOwned + CursorPage,
    F: FnMut(P),
{
    let mut stats = PageStats::default();
    let mut cursor: Option<String> = None;

    loop {
        if let Some(limit) = limit {
            if stats.pages + stats.failed_pages >= limit.max_pages {
                return Err(PaginationError::LimitExceeded {
                    limit: limit.max_pages,
                    stats,
                });
            }
        }

        let request = GraphqlRequest::new(
            query.clone(),
            CursorVariables {
                cursor: cursor.clone(),
            },
        );
        let response = match client.execute::<_, P>(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, cursor = ?cursor, "dropping GraphQL page");
                stats.failed_pages += 1;
                break;
            }
        };

        if !response.errors.is_empty() {
            let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
            warn!(errors = ?messages, "GraphQL page returned errors");
        }

        let Some(page) = response.data else {
            warn!(cursor = ?cursor, "GraphQL page carried no data");
            stats.failed_pages += 1;
            break;
        };

        let next = page.next_cursor().and_then(cursor_from_value);
        on_page(page);
        stats.pages += 1;
        debug!(pages = stats.pages, next = ?next, "GraphQL page processed");

        match next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(stats)
}
