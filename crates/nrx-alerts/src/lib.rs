//! NRX Alerts - alert policy and NRQL condition inventory.
//!
//! This crate provides:
//! - Policy and condition fetchers over NerdGraph entity search.
//! - An in-memory store linking conditions to their policies.
//! - A fixed-size worker pool that fills in NRQL query text.
//! - CSV and Terraform writers, the latter driven by a pluggable [`Scraper`].

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod conditions;
mod csv_export;
mod enrich;
mod error;
mod model;
mod pipeline;
mod policies;
mod queries;
mod scraper;
mod store;
mod terraform;

pub use conditions::{ConditionFetchStats, fetch_conditions};
pub use csv_export::{CSV_HEADER, csv_file_name, write_csv, write_csv_to};
pub use enrich::{DEFAULT_ENRICH_WORKERS, DetailEnricher, EnrichStats, NOT_FOUND_MESSAGE, fetch_detail};
pub use error::{AlertsError, AlertsResult, parse_id};
pub use model::{CONDITION_ENTITY_TYPE, Condition, Entity, EntityTag, Policy};
pub use pipeline::{CollectStats, OutputMode, RunConfig, RunSummary, collect, run};
pub use policies::{PolicyFetchStats, fetch_policies};
pub use queries::{
    CONDITION_DETAIL_QUERY, ConditionDetailVariables, condition_search_query, policy_search_query,
};
pub use scraper::{Scraper, TemplateScraper};
pub use store::{ConditionDetail, LocalStore};
pub use terraform::{
    MAX_SCRAPE_CONCURRENCY, TerraformStats, TerraformWriter, hcl_string, policy_file_name,
    render_policy_header,
};
