//! Policy fetcher.

use nrx_graphql::{GraphqlClient, PageLimit, PaginationError, paginate_cursor};
use tracing::{info, instrument, warn};

use crate::queries::{PolicySearchData, policy_search_query};
use crate::store::LocalStore;

/// Outcome of a policy fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyFetchStats {
    /// Pages handled.
    pub pages: usize,
    /// Policies stored.
    pub stored: usize,
    /// Policies dropped for an unparseable id.
    pub skipped: usize,
}

/// Enumerate every policy of the store's account into the store, then
/// rebuild the sorted policy id list.
#[instrument(skip_all, fields(account_id = store.account_id()))]
pub async fn fetch_policies(
    client: &GraphqlClient,
    store: &mut LocalStore,
    limit: Option<PageLimit>,
) -> PolicyFetchStats {
    let query = policy_search_query(store.account_id());
    let mut stats = PolicyFetchStats::default();

    let result = paginate_cursor::<PolicySearchData, _>(client, &query, limit, |page| {
        for policy in page.into_policies() {
            let name = policy.name.clone();
            match store.insert_policy(policy) {
                Ok(_) => stats.stored += 1,
                Err(err) => {
                    warn!(error = %err, policy_name = %name, "skipping policy");
                    stats.skipped += 1;
                }
            }
        }
    })
    .await;

    match result {
        Ok(pages) => stats.pages = pages.pages,
        Err(PaginationError::LimitExceeded { limit, stats: pages }) => {
            warn!(limit, "policy search stopped at page limit");
            stats.pages = pages.pages;
        }
    }

    store.refresh_policy_ids();
    info!(policies = store.policies().len(), pages = stats.pages, "found policies");
    stats
}
