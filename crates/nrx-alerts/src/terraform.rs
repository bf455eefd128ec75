//! Terraform export: one `policy_<id>.tf` per policy, written by a pool of
//! scrape workers.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::error::{AlertsError, AlertsResult};
use crate::model::Policy;
use crate::scraper::Scraper;
use crate::store::LocalStore;

/// Upper bound on scrape workers.
pub const MAX_SCRAPE_CONCURRENCY: usize = 20;

/// File name for a policy's Terraform.
#[must_use]
pub fn policy_file_name(policy: &Policy) -> String {
    format!("policy_{}.tf", policy.id)
}

/// Quote a value as an HCL string literal.
///
/// `${` and `%{` are doubled so Terraform reads them literally.
#[must_use]
pub fn hcl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `newrelic_alert_policy` block followed by a blank line.
#[must_use]
pub fn render_policy_header(policy: &Policy) -> String {
    format!(
        "resource \"newrelic_alert_policy\" \"policy_{id}\" {{\n  \
         account_id = {account_id}\n  \
         policy_id = {id}\n  \
         name = {name}\n  \
         incident_preference = {preference}\n\
         }}\n\n",
        id = policy.id,
        account_id = policy.account_id,
        name = hcl_string(&policy.name),
        preference = hcl_string(&policy.incident_preference),
    )
}

/// Outcome of a Terraform export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerraformStats {
    /// Files written, in ascending policy id order.
    pub files: Vec<PathBuf>,
    /// Condition snippets included.
    pub snippets: usize,
    /// Condition snippets omitted after a scrape failure.
    pub failed_snippets: usize,
    /// Policies whose file could not be written.
    pub failed_files: usize,
}

#[derive(Debug, Default)]
struct PolicyOutcome {
    snippets: usize,
    failed_snippets: usize,
}

/// Writes policy files by fanning policies out over scrape workers.
pub struct TerraformWriter {
    scraper: Arc<dyn Scraper>,
    concurrency: usize,
    output_dir: PathBuf,
}

impl std::fmt::Debug for TerraformWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerraformWriter")
            .field("concurrency", &self.concurrency)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl TerraformWriter {
    /// Single-worker writer into `output_dir`.
    pub fn new(scraper: Arc<dyn Scraper>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            scraper,
            concurrency: 1,
            output_dir: output_dir.into(),
        }
    }

    /// Set the worker count, clamped to `1..=MAX_SCRAPE_CONCURRENCY`.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_SCRAPE_CONCURRENCY);
        self
    }

    /// Effective worker count.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Log in, write every policy file, log out.
    ///
    /// A login failure is returned before anything is written. A logout
    /// failure is only logged.
    #[instrument(skip_all, fields(account_id = store.account_id(), concurrency = self.concurrency))]
    pub async fn run(&self, store: Arc<LocalStore>) -> AlertsResult<TerraformStats> {
        self.scraper.login().await?;
        let stats = self.write_all(store).await;
        if let Err(err) = self.scraper.logout().await {
            warn!(error = %err, "scraper logout failed");
        }
        info!(
            files = stats.files.len(),
            snippets = stats.snippets,
            failed_snippets = stats.failed_snippets,
            "wrote terraform"
        );
        Ok(stats)
    }

    async fn write_all(&self, store: Arc<LocalStore>) -> TerraformStats {
        let ids = store.policy_ids().to_vec();
        let (tx, rx) = mpsc::channel::<i64>(ids.len().max(1));
        for id in ids {
            if tx.send(id).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(self.concurrency);
        for index in 0..self.concurrency {
            let worker = index + 1;
            let rx = Arc::clone(&rx);
            let store = Arc::clone(&store);
            let scraper = Arc::clone(&self.scraper);
            let output_dir = self.output_dir.clone();
            handles.push(tokio::spawn(async move {
                let mut stats = TerraformStats::default();
                let mut written = Vec::new();
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(policy_id) = next else { break };
                    let Some(policy) = store.policy(policy_id) else {
                        continue;
                    };
                    debug!(worker, policy_id, "scraping policy");
                    match write_policy(&store, scraper.as_ref(), policy, &output_dir).await {
                        Ok((path, outcome)) => {
                            written.push((policy_id, path));
                            stats.snippets += outcome.snippets;
                            stats.failed_snippets += outcome.failed_snippets;
                        }
                        Err(err) => {
                            warn!(worker, policy_id, error = %err, "failed to write policy file");
                            stats.failed_files += 1;
                        }
                    }
                }
                (stats, written)
            }));
        }

        let mut total = TerraformStats::default();
        let mut written = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((stats, files)) => {
                    written.extend(files);
                    total.snippets += stats.snippets;
                    total.failed_snippets += stats.failed_snippets;
                    total.failed_files += stats.failed_files;
                }
                Err(err) => warn!(error = %err, "scrape worker aborted"),
            }
        }
        written.sort_unstable_by_key(|(policy_id, _)| *policy_id);
        total.files = written.into_iter().map(|(_, path)| path).collect();
        total
    }
}

async fn write_policy(
    store: &LocalStore,
    scraper: &dyn Scraper,
    policy: &Policy,
    output_dir: &Path,
) -> AlertsResult<(PathBuf, PolicyOutcome)> {
    let mut outcome = PolicyOutcome::default();
    let mut body = render_policy_header(policy);
    for condition in store.conditions_of(policy) {
        match scraper.scrape_condition(policy, condition).await {
            Ok(snippet) => {
                body.push_str(&snippet);
                outcome.snippets += 1;
            }
            Err(err) => {
                warn!(
                    policy_id = %policy.id,
                    condition_id = %condition.id,
                    error = %err,
                    "omitting condition snippet"
                );
                outcome.failed_snippets += 1;
            }
        }
    }
    body.push('\n');

    let path = output_dir.join(policy_file_name(policy));
    tokio::fs::write(&path, body)
        .await
        .map_err(|err| AlertsError::io(&path, err))?;
    Ok((path, outcome))
}
