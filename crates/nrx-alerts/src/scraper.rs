//! Scraper collaborator: produces the Terraform snippet of one condition.

use async_trait::async_trait;

use crate::error::AlertsResult;
use crate::model::{Condition, Policy};
use crate::terraform::hcl_string;

/// Source of per-condition Terraform snippets.
///
/// `login` is called once before any scrape and `logout` once after every
/// policy file is written. Implementations are shared across scrape workers.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Establish the session. Failure aborts the run.
    async fn login(&self) -> AlertsResult<()>;

    /// Snippet appended to the policy's file for this condition.
    async fn scrape_condition(&self, policy: &Policy, condition: &Condition)
        -> AlertsResult<String>;

    /// Tear down the session.
    async fn logout(&self) -> AlertsResult<()>;
}

/// Renders `newrelic_nrql_alert_condition` resources from API data.
///
/// Needs no session. Conditions without NRQL text are emitted as a comment.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateScraper;

impl TemplateScraper {
    /// Render the snippet for a condition.
    #[must_use]
    pub fn render(policy: &Policy, condition: &Condition) -> String {
        if condition.query.is_empty() {
            return format!(
                "# condition {} {} ({}) has no NRQL query and was not exported\n\n",
                condition.id,
                hcl_string(&condition.name),
                condition.guid
            );
        }

        let condition_type = condition
            .condition_type
            .as_deref()
            .map_or_else(|| "static".to_string(), str::to_ascii_lowercase);
        let condition_type = hcl_string(&condition_type);
        format!(
            "resource \"newrelic_nrql_alert_condition\" \"condition_{id}\" {{\n  \
             account_id = {account_id}\n  \
             policy_id = newrelic_alert_policy.policy_{policy_id}.id\n  \
             type = {condition_type}\n  \
             name = {name}\n  \
             enabled = {enabled}\n\n  \
             nrql {{\n    \
             query = {query}\n  \
             }}\n\
             }}\n\n",
            id = condition.id,
            account_id = condition.account_id,
            policy_id = policy.id,
            name = hcl_string(&condition.name),
            enabled = condition.enabled.unwrap_or(true),
            query = hcl_string(&condition.query),
        )
    }
}

#[async_trait]
impl Scraper for TemplateScraper {
    async fn login(&self) -> AlertsResult<()> {
        Ok(())
    }

    async fn scrape_condition(
        &self,
        policy: &Policy,
        condition: &Condition,
    ) -> AlertsResult<String> {
        Ok(Self::render(policy, condition))
    }

    async fn logout(&self) -> AlertsResult<()> {
        Ok(())
    }
}
