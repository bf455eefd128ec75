//! Detail enricher: fetches NRQL query text for every stored condition with a
//! fixed pool of workers.
//!
//! Topology is one producer, `workers` consumers, one sink. The producer
//! enqueues every condition id in export order followed by one `Stop` per
//! worker on a channel sized so it never blocks. Each worker owns its own
//! HTTP client and answers on a second channel, ending with a `Done`. The
//! sink is the only writer to the store and returns once it has counted a
//! `Done` from every worker.

use std::sync::Arc;

use nrx_graphql::{
    GraphqlClient, GraphqlClientBuilder, GraphqlClientError, GraphqlQuery, GraphqlRequest,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::error::AlertsResult;
use crate::queries::{CONDITION_DETAIL_QUERY, ConditionDetailData, ConditionDetailVariables};
use crate::store::{ConditionDetail, LocalStore};

/// Default number of detail workers.
pub const DEFAULT_ENRICH_WORKERS: usize = 8;

/// GraphQL error message meaning the condition is not an NRQL condition.
pub const NOT_FOUND_MESSAGE: &str = "Not Found";

#[derive(Debug)]
enum WorkItem {
    Fetch(i64),
    Stop,
}

#[derive(Debug)]
enum WorkOutput {
    Detail { id: i64, detail: ConditionDetail },
    Done { worker: usize },
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    not_found: usize,
    failed: usize,
}

/// Outcome of an enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    /// Condition ids enqueued.
    pub requested: usize,
    /// Conditions that received query text.
    pub enriched: usize,
    /// Lookups answered with "Not Found".
    pub not_found: usize,
    /// Lookups dropped for transport, decode, or GraphQL errors.
    pub failed: usize,
    /// Results whose id was missing from the store.
    pub unknown: usize,
    /// `Done` markers received by the sink.
    pub workers_finished: usize,
}

/// Fixed-size worker pool for NRQL detail lookups.
#[derive(Debug, Clone)]
pub struct DetailEnricher {
    builder: GraphqlClientBuilder,
    workers: usize,
}

impl DetailEnricher {
    /// Pool with [`DEFAULT_ENRICH_WORKERS`] workers. Every worker builds its
    /// own client from `builder`.
    #[must_use]
    pub const fn new(builder: GraphqlClientBuilder) -> Self {
        Self {
            builder,
            workers: DEFAULT_ENRICH_WORKERS,
        }
    }

    /// Override the worker count (minimum 1).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Configured worker count.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch and merge query text for every condition in the store.
    #[instrument(skip_all, fields(account_id = store.account_id(), workers = self.workers))]
    pub async fn run(&self, store: &mut LocalStore) -> AlertsResult<EnrichStats> {
        let ids = store.condition_ids_in_order();
        let capacity = ids.len() + self.workers;
        let (input_tx, input_rx) = mpsc::channel::<WorkItem>(capacity);
        let (output_tx, mut output_rx) = mpsc::channel::<WorkOutput>(capacity);

        let mut stats = EnrichStats {
            requested: ids.len(),
            ..EnrichStats::default()
        };

        let mut clients = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            clients.push(self.builder.clone().build()?);
        }

        // Producer: capacity covers every item, so these sends never wait.
        for id in ids {
            if input_tx.send(WorkItem::Fetch(id)).await.is_err() {
                break;
            }
        }
        for _ in 0..self.workers {
            if input_tx.send(WorkItem::Stop).await.is_err() {
                break;
            }
        }
        drop(input_tx);

        let input_rx = Arc::new(Mutex::new(input_rx));
        let account_id = store.account_id();
        let mut handles = Vec::with_capacity(self.workers);
        for (index, client) in clients.into_iter().enumerate() {
            let worker = index + 1;
            debug!(worker, "starting condition detail worker");
            handles.push(tokio::spawn(run_worker(
                worker,
                client,
                account_id,
                Arc::clone(&input_rx),
                output_tx.clone(),
            )));
        }
        drop(output_tx);

        // Sink: the only writer to the store.
        while stats.workers_finished < self.workers {
            match output_rx.recv().await {
                Some(WorkOutput::Detail { id, detail }) => {
                    if store.apply_detail(id, detail) {
                        stats.enriched += 1;
                    } else {
                        warn!(condition_id = id, "no stored condition for detail result");
                        stats.unknown += 1;
                    }
                }
                Some(WorkOutput::Done { worker }) => {
                    stats.workers_finished += 1;
                    debug!(worker, "condition detail worker finished");
                }
                None => break,
            }
        }

        for handle in handles {
            match handle.await {
                Ok(worker_stats) => {
                    stats.not_found += worker_stats.not_found;
                    stats.failed += worker_stats.failed;
                }
                Err(err) => warn!(error = %err, "condition detail worker aborted"),
            }
        }

        info!(
            requested = stats.requested,
            enriched = stats.enriched,
            not_found = stats.not_found,
            failed = stats.failed,
            "finished condition detail lookups"
        );
        Ok(stats)
    }
}

async fn run_worker(
    worker: usize,
    client: GraphqlClient,
    account_id: i64,
    input: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    output: mpsc::Sender<WorkOutput>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        let item = input.lock().await.recv().await;
        let id = match item {
            Some(WorkItem::Fetch(id)) => id,
            Some(WorkItem::Stop) | None => break,
        };

        match fetch_detail(&client, account_id, id).await {
            Ok(Some(detail)) => {
                if output.send(WorkOutput::Detail { id, detail }).await.is_err() {
                    return stats;
                }
            }
            Ok(None) => stats.not_found += 1,
            Err(err) => {
                warn!(worker, condition_id = id, error = %err, "condition detail lookup failed");
                stats.failed += 1;
            }
        }
    }
    let _ = output.send(WorkOutput::Done { worker }).await;
    stats
}

/// Look up one condition's NRQL detail.
///
/// `Ok(None)` means the server answered "Not Found", i.e. the condition is
/// not an NRQL condition.
pub async fn fetch_detail(
    client: &GraphqlClient,
    account_id: i64,
    condition_id: i64,
) -> Result<Option<ConditionDetail>, GraphqlClientError> {
    let request = GraphqlRequest::new(
        GraphqlQuery::new(CONDITION_DETAIL_QUERY),
        ConditionDetailVariables {
            account_id,
            condition_id: condition_id.to_string(),
        },
    );
    let response = client.execute::<_, ConditionDetailData>(&request).await?;
    let data = match response.into_data() {
        Ok(data) => data,
        Err(err) if err.first_message_is(NOT_FOUND_MESSAGE) => return Ok(None),
        Err(err) => return Err(err),
    };

    let condition = data.into_condition().unwrap_or_default();
    Ok(Some(ConditionDetail {
        query: condition.nrql.and_then(|nrql| nrql.query).unwrap_or_default(),
        condition_type: condition.condition_type,
        enabled: condition.enabled,
    }))
}
