//! NRX GraphQL - NerdGraph client plumbing for the alert exporter.
//!
//! This crate provides:
//! - A GraphQL POST client with fixed-delay retry.
//! - Request/response envelopes and GraphQL error mapping.
//! - A cursor paginator that tolerates untyped `nextCursor` values.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod client;
mod error;
mod operation;
mod pagination;
mod retry;

pub use client::{
    API_KEY_HEADER, DEFAULT_ENDPOINT, GraphqlClient, GraphqlClientBuilder, GraphqlClientConfig,
    GraphqlClientMetrics, GraphqlClientMetricsSnapshot,
};
pub use error::{GraphqlClientError, GraphqlError, HttpErrorInfo};
pub use operation::{GraphqlQuery, GraphqlRequest, GraphqlResponse, null_as_default};
pub use pagination::{
    CursorPage, CursorVariables, PageLimit, PageStats, PaginationError, cursor_from_value,
    paginate_cursor,
};
pub use retry::{RetryDecision, RetryPolicy};
