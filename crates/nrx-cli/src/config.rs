//! Command-line and environment configuration.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::builder::{FalseyValueParser, NonEmptyStringValueParser};
use nrx_alerts::{DEFAULT_ENRICH_WORKERS, MAX_SCRAPE_CONCURRENCY, OutputMode, RunConfig};
use nrx_graphql::DEFAULT_ENDPOINT;
use tracing::warn;

/// Export New Relic alert policies and NRQL conditions as CSV or Terraform.
#[derive(Parser, Debug)]
#[command(name = "nrx")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Account id to export.
    #[arg(long, env = "NEW_RELIC_ACCOUNT")]
    pub account: i64,

    /// User API key.
    #[arg(long, env = "NEW_RELIC_USER_KEY", hide_env_values = true,
          value_parser = NonEmptyStringValueParser::new())]
    pub user_key: String,

    /// Policies scraped in parallel in Terraform mode (1 to 20).
    #[arg(long, env = "CONCURRENT", default_value_t = 1, allow_negative_numbers = true)]
    pub concurrent: i64,

    /// Write `alerts_<account>.csv` instead of Terraform files.
    #[arg(long)]
    pub csv: bool,

    /// Accepted for compatibility; has no effect.
    #[arg(long)]
    pub disable: bool,

    /// NerdGraph endpoint.
    #[arg(long, env = "NEW_RELIC_GRAPHQL_URL", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Directory receiving output files.
    #[arg(long, env = "NRX_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Condition detail workers.
    #[arg(long, env = "NRX_ENRICH_WORKERS", default_value_t = DEFAULT_ENRICH_WORKERS)]
    pub workers: usize,

    /// Stop each search after this many pages.
    #[arg(long, env = "NRX_MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "NRX_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Emit JSON log lines.
    #[arg(long, env = "NRX_JSON_LOGS", value_parser = FalseyValueParser::new())]
    pub json_logs: bool,
}

impl Cli {
    /// Validated run settings.
    pub fn into_run_config(self) -> RunConfig {
        let mut config = RunConfig::new(self.account, self.user_key);
        config.endpoint = self.endpoint;
        config.output_dir = self.output_dir;
        config.mode = if self.csv {
            OutputMode::Csv
        } else {
            OutputMode::Terraform
        };
        config.enrich_workers = self.workers.max(1);
        config.scrape_concurrency = scrape_concurrency(self.concurrent);
        config.disable = self.disable;
        config.max_pages = self.max_pages;
        config.timeout = self.timeout_secs.map(Duration::from_secs);
        config
    }
}

/// Clamp `CONCURRENT` into `1..=MAX_SCRAPE_CONCURRENCY`.
pub fn scrape_concurrency(requested: i64) -> usize {
    if requested < 1 {
        warn!(requested, "concurrency below 1, using 1");
        return 1;
    }
    match usize::try_from(requested) {
        Ok(value) if value <= MAX_SCRAPE_CONCURRENCY => value,
        _ => {
            warn!(
                requested,
                max = MAX_SCRAPE_CONCURRENCY,
                "concurrency above maximum, clamping"
            );
            MAX_SCRAPE_CONCURRENCY
        }
    }
}

/// Rewrite the single-dash `-csv` and `-disable` spellings to long flags.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-csv") => OsString::from("--csv"),
            Some("-disable") => OsString::from("--disable"),
            _ => arg,
        })
        .collect()
}
