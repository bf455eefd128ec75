//! NerdGraph query texts and the response shapes they decode into.

use nrx_graphql::{CursorPage, GraphqlQuery};
use serde::{Deserialize, Serialize};

use crate::model::{Entity, Policy};

/// Policy search, paginated by `$cursor`.
#[must_use]
pub fn policy_search_query(account_id: i64) -> GraphqlQuery {
    GraphqlQuery::new(format!(
        "query($cursor: String) {{actor {{account(id: {account_id}) {{alerts \
         {{policiesSearch(cursor: $cursor) {{policies {{id incidentPreference name accountId}} \
         nextCursor}}}}}}}}}}"
    ))
}

/// AIOPS condition entity search, paginated by `$cursor`.
#[must_use]
pub fn condition_search_query(account_id: i64) -> GraphqlQuery {
    GraphqlQuery::new(format!(
        "query EntitySearchQuery($cursor: String) {{actor {{entitySearch(query: \
         \"domain = 'AIOPS' AND type = 'CONDITION' AND accountId = {account_id}\", \
         options: {{tagFilter: [\"id\",\"policyId\"]}}) {{results(cursor: $cursor) \
         {{entities {{guid accountId type name tags {{key values}}}} nextCursor}}}}}}}}"
    ))
}

/// NRQL detail lookup for a single condition.
pub const CONDITION_DETAIL_QUERY: &str = "query getConditionDetail($accountId: Int!, \
     $conditionId: ID!) {actor {account(id: $accountId) {alerts {nrqlCondition(id: \
     $conditionId) {nrql {query} name id enabled type}}}}}";

/// Variables of [`CONDITION_DETAIL_QUERY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDetailVariables {
    /// Account the condition lives in.
    pub account_id: i64,
    /// Condition id, sent as a GraphQL `ID`.
    pub condition_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct Actor<T> {
    #[serde(default)]
    actor: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct AccountAlerts<T> {
    #[serde(default)]
    account: Option<Alerts<T>>,
}

#[derive(Debug, Default, Deserialize)]
struct Alerts<T> {
    #[serde(default)]
    alerts: Option<T>,
}

/// Page of `policiesSearch`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoliciesSearch {
    /// Policies in this page.
    #[serde(default)]
    pub policies: Option<Vec<Policy>>,
    /// Untyped cursor of the next page.
    #[serde(default)]
    pub next_cursor: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyAlerts {
    #[serde(default)]
    policies_search: Option<PoliciesSearch>,
}

/// `data` of a policy search response.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct PolicySearchData(Actor<AccountAlerts<PolicyAlerts>>);

impl PolicySearchData {
    fn search(&self) -> Option<&PoliciesSearch> {
        self.0
            .actor
            .as_ref()?
            .account
            .as_ref()?
            .alerts
            .as_ref()?
            .policies_search
            .as_ref()
    }

    /// Policies carried by this page.
    pub fn into_policies(self) -> Vec<Policy> {
        self.0
            .actor
            .and_then(|actor| actor.account)
            .and_then(|account| account.alerts)
            .and_then(|alerts| alerts.policies_search)
            .and_then(|search| search.policies)
            .unwrap_or_default()
    }
}

impl CursorPage for PolicySearchData {
    fn next_cursor(&self) -> Option<&serde_json::Value> {
        self.search()?.next_cursor.as_ref()
    }
}

/// Page of entity search results.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResults {
    /// Entities in this page.
    #[serde(default)]
    pub entities: Option<Vec<Entity>>,
    /// Untyped cursor of the next page.
    #[serde(default)]
    pub next_cursor: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntitySearchActor {
    #[serde(default)]
    entity_search: Option<EntitySearch>,
}

#[derive(Debug, Default, Deserialize)]
struct EntitySearch {
    #[serde(default)]
    results: Option<EntityResults>,
}

/// `data` of a condition entity search response.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ConditionSearchData(Actor<EntitySearchActor>);

impl ConditionSearchData {
    fn results(&self) -> Option<&EntityResults> {
        self.0
            .actor
            .as_ref()?
            .entity_search
            .as_ref()?
            .results
            .as_ref()
    }

    /// Entities carried by this page.
    pub fn into_entities(self) -> Vec<Entity> {
        self.0
            .actor
            .and_then(|actor| actor.entity_search)
            .and_then(|search| search.results)
            .and_then(|results| results.entities)
            .unwrap_or_default()
    }
}

impl CursorPage for ConditionSearchData {
    fn next_cursor(&self) -> Option<&serde_json::Value> {
        self.results()?.next_cursor.as_ref()
    }
}

/// NRQL block of a condition.
#[derive(Debug, Default, Deserialize)]
pub struct Nrql {
    /// Query text.
    #[serde(default)]
    pub query: Option<String>,
}

/// `nrqlCondition` payload.
#[derive(Debug, Default, Deserialize)]
pub struct NrqlCondition {
    /// Condition id.
    #[serde(default)]
    pub id: Option<String>,
    /// Condition name.
    #[serde(default)]
    pub name: Option<String>,
    /// NRQL block.
    #[serde(default)]
    pub nrql: Option<Nrql>,
    /// Enabled flag.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Condition type.
    #[serde(default, rename = "type")]
    pub condition_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailAlerts {
    #[serde(default)]
    nrql_condition: Option<NrqlCondition>,
}

/// `data` of a condition detail response.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct ConditionDetailData(Actor<AccountAlerts<DetailAlerts>>);

impl ConditionDetailData {
    /// The `nrqlCondition` object, if the server returned one.
    pub fn into_condition(self) -> Option<NrqlCondition> {
        self.0
            .actor
            .and_then(|actor| actor.account)
            .and_then(|account| account.alerts)
            .and_then(|alerts| alerts.nrql_condition)
    }
}
