//! End-to-end export run: fetch, link, enrich, write.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nrx_graphql::{DEFAULT_ENDPOINT, GraphqlClientBuilder, PageLimit, RetryPolicy};
use tracing::{info, instrument};

use crate::conditions::{ConditionFetchStats, fetch_conditions};
use crate::csv_export::write_csv;
use crate::enrich::{DEFAULT_ENRICH_WORKERS, DetailEnricher, EnrichStats};
use crate::error::{AlertsError, AlertsResult};
use crate::policies::{PolicyFetchStats, fetch_policies};
use crate::scraper::Scraper;
use crate::store::LocalStore;
use crate::terraform::{TerraformStats, TerraformWriter};

/// What the run produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// One `alerts_<account>.csv`.
    Csv,
    /// One `policy_<id>.tf` per policy.
    #[default]
    Terraform,
}

/// Validated settings for one export run.
#[derive(Clone)]
pub struct RunConfig {
    /// Account to export.
    pub account_id: i64,
    /// User API key.
    pub user_key: String,
    /// GraphQL endpoint.
    pub endpoint: String,
    /// Directory receiving output files.
    pub output_dir: PathBuf,
    /// Output format.
    pub mode: OutputMode,
    /// Detail enricher worker count.
    pub enrich_workers: usize,
    /// Scrape worker count for Terraform output.
    pub scrape_concurrency: usize,
    /// Advisory disable flag; logged only.
    pub disable: bool,
    /// Page cap per search.
    pub max_pages: Option<usize>,
    /// Retry policy for every client.
    pub retry: RetryPolicy,
    /// Per-request timeout; `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("account_id", &self.account_id)
            .field("user_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("output_dir", &self.output_dir)
            .field("mode", &self.mode)
            .field("enrich_workers", &self.enrich_workers)
            .field("scrape_concurrency", &self.scrape_concurrency)
            .field("disable", &self.disable)
            .field("max_pages", &self.max_pages)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RunConfig {
    /// Config with defaults for everything but the credentials.
    pub fn new(account_id: i64, user_key: impl Into<String>) -> Self {
        Self {
            account_id,
            user_key: user_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            output_dir: PathBuf::from("."),
            mode: OutputMode::default(),
            enrich_workers: DEFAULT_ENRICH_WORKERS,
            scrape_concurrency: 1,
            disable: false,
            max_pages: None,
            retry: RetryPolicy::default(),
            timeout: None,
        }
    }

    /// Client builder carrying endpoint, key, retry policy, and timeout.
    pub fn client_builder(&self) -> AlertsResult<GraphqlClientBuilder> {
        if self.user_key.is_empty() {
            return Err(AlertsError::Config("user API key is empty".into()));
        }
        let mut builder = GraphqlClientBuilder::new(self.endpoint.clone())
            .with_api_key(&self.user_key)?
            .with_retry_policy(self.retry);
        if let Some(timeout) = self.timeout {
            builder = builder.with_timeout(timeout);
        }
        Ok(builder)
    }

    fn page_limit(&self) -> Option<PageLimit> {
        self.max_pages.map(PageLimit::new)
    }
}

/// Counters from a completed collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Policy fetch outcome.
    pub policies: PolicyFetchStats,
    /// Condition fetch outcome.
    pub conditions: ConditionFetchStats,
    /// Enrichment outcome.
    pub enrich: EnrichStats,
}

/// Result of a full run.
#[derive(Debug)]
pub struct RunSummary {
    /// The populated store.
    pub store: Arc<LocalStore>,
    /// Collection counters.
    pub collect: CollectStats,
    /// Files written.
    pub files: Vec<PathBuf>,
    /// Terraform counters, in Terraform mode.
    pub terraform: Option<TerraformStats>,
}

/// Fetch policies, then conditions, then NRQL details into a new store.
#[instrument(skip_all, fields(account_id = config.account_id))]
pub async fn collect(config: &RunConfig) -> AlertsResult<(LocalStore, CollectStats)> {
    let builder = config.client_builder()?;
    let client = builder.clone().build()?;
    let mut store = LocalStore::new(config.account_id);

    let policies = fetch_policies(&client, &mut store, config.page_limit()).await;
    let conditions = fetch_conditions(&client, &mut store, config.page_limit()).await;
    let enricher = DetailEnricher::new(builder).with_workers(config.enrich_workers);
    info!(
        conditions = store.conditions().len(),
        workers = enricher.workers(),
        "looking up condition details"
    );
    let enrich = enricher.run(&mut store).await?;

    Ok((
        store,
        CollectStats {
            policies,
            conditions,
            enrich,
        },
    ))
}

/// Collect and write output in the configured mode.
///
/// `scraper` is used only in Terraform mode.
#[instrument(skip_all, fields(account_id = config.account_id, mode = ?config.mode))]
pub async fn run(config: &RunConfig, scraper: Arc<dyn Scraper>) -> AlertsResult<RunSummary> {
    if config.disable {
        info!("disable flag set; it has no effect on export");
    }
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|err| AlertsError::io(&config.output_dir, err))?;

    let (store, collect) = collect(config).await?;
    let store = Arc::new(store);

    match config.mode {
        OutputMode::Csv => {
            let path = write_csv(&store, &config.output_dir)?;
            Ok(RunSummary {
                store,
                collect,
                files: vec![path],
                terraform: None,
            })
        }
        OutputMode::Terraform => {
            let stats = TerraformWriter::new(scraper, config.output_dir.clone())
                .with_concurrency(config.scrape_concurrency)
                .run(Arc::clone(&store))
                .await?;
            Ok(RunSummary {
                store,
                collect,
                files: stats.files.clone(),
                terraform: Some(stats),
            })
        }
    }
}
