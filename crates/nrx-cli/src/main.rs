//! `nrx` entrypoint.
//!
//! Exports every alert policy and NRQL condition of one account:
//! - `nrx --csv` writes `alerts_<account>.csv`
//! - `nrx` writes one `policy_<id>.tf` per policy

#![forbid(unsafe_code)]

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;
use nrx_alerts::{RunConfig, TemplateScraper};
use tracing::{error, info};

use config::{Cli, normalize_args};

fn init_tracing(json: bool) {
    // Logs go to stderr; stdout only lists written files.
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn export(config: RunConfig) -> anyhow::Result<()> {
    info!(
        account_id = config.account_id,
        mode = ?config.mode,
        endpoint = %config.endpoint,
        "starting export"
    );
    let summary = nrx_alerts::run(&config, Arc::new(TemplateScraper))
        .await
        .with_context(|| format!("export of account {} failed", config.account_id))?;

    info!(
        policies = summary.store.policies().len(),
        conditions = summary.store.conditions().len(),
        files = summary.files.len(),
        "export complete"
    );
    for path in &summary.files {
        println!("{}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    init_tracing(cli.json_logs);
    let config = cli.into_run_config();

    match export(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let message = format!("{err:#}");
            error!(error = %message, "nrx failed");
            ExitCode::FAILURE
        }
    }
}
