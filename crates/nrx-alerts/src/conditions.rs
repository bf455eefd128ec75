//! Condition fetcher.

use nrx_graphql::{GraphqlClient, PageLimit, PaginationError, paginate_cursor};
use tracing::{info, instrument, warn};

use crate::error::AlertsError;
use crate::model::Condition;
use crate::queries::{ConditionSearchData, condition_search_query};
use crate::store::LocalStore;

/// Outcome of a condition fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConditionFetchStats {
    /// Pages handled.
    pub pages: usize,
    /// Conditions linked into a policy.
    pub linked: usize,
    /// Entities rejected by the tag parser.
    pub invalid: usize,
    /// Conditions whose policy is not in the store.
    pub orphaned: usize,
}

/// Enumerate every AIOPS condition entity of the store's account and link
/// each into its owning policy.
///
/// Policies must already be in the store; conditions of unknown policies
/// are dropped.
#[instrument(skip_all, fields(account_id = store.account_id()))]
pub async fn fetch_conditions(
    client: &GraphqlClient,
    store: &mut LocalStore,
    limit: Option<PageLimit>,
) -> ConditionFetchStats {
    let query = condition_search_query(store.account_id());
    let mut stats = ConditionFetchStats::default();

    let result = paginate_cursor::<ConditionSearchData, _>(client, &query, limit, |page| {
        for entity in page.into_entities() {
            let condition = match Condition::try_from(&entity) {
                Ok(condition) => condition,
                Err(err) => {
                    warn!(error = %err, "skipping condition entity");
                    stats.invalid += 1;
                    continue;
                }
            };
            match store.link_condition(condition) {
                Ok(_) => stats.linked += 1,
                Err(err @ AlertsError::OrphanCondition { .. }) => {
                    warn!(error = %err, guid = %entity.guid, "dropping orphan condition");
                    stats.orphaned += 1;
                }
                Err(err) => {
                    warn!(error = %err, guid = %entity.guid, "skipping condition");
                    stats.invalid += 1;
                }
            }
        }
    })
    .await;

    match result {
        Ok(pages) => stats.pages = pages.pages,
        Err(PaginationError::LimitExceeded { limit, stats: pages }) => {
            warn!(limit, "condition search stopped at page limit");
            stats.pages = pages.pages;
        }
    }

    info!(
        conditions = stats.linked,
        orphaned = stats.orphaned,
        invalid = stats.invalid,
        "found conditions"
    );
    stats
}
