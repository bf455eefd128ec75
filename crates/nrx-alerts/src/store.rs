//! In-memory store of policies, conditions, and the policy to condition index.

use std::collections::HashMap;

use crate::error::{AlertsError, AlertsResult, parse_id};
use crate::model::{Condition, Policy};

/// NRQL detail merged into a stored condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionDetail {
    /// NRQL query text.
    pub query: String,
    /// Condition type, when reported.
    pub condition_type: Option<String>,
    /// Enabled flag, when reported.
    pub enabled: Option<bool>,
}

/// All state for one export run.
///
/// Keys are the integer form of the server's string ids; the string form is
/// kept on each record for output.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    account_id: i64,
    policies: HashMap<i64, Policy>,
    conditions: HashMap<i64, Condition>,
    policy_ids: Vec<i64>,
}

impl LocalStore {
    /// Empty store for an account.
    #[must_use]
    pub fn new(account_id: i64) -> Self {
        Self {
            account_id,
            ..Self::default()
        }
    }

    /// Account being exported.
    #[must_use]
    pub const fn account_id(&self) -> i64 {
        self.account_id
    }

    /// Policies keyed by numeric id.
    #[must_use]
    pub const fn policies(&self) -> &HashMap<i64, Policy> {
        &self.policies
    }

    /// Conditions keyed by numeric id.
    #[must_use]
    pub const fn conditions(&self) -> &HashMap<i64, Condition> {
        &self.conditions
    }

    /// Policy ids in ascending order, as of the last [`Self::refresh_policy_ids`].
    #[must_use]
    pub fn policy_ids(&self) -> &[i64] {
        &self.policy_ids
    }

    /// Policy by numeric id.
    #[must_use]
    pub fn policy(&self, id: i64) -> Option<&Policy> {
        self.policies.get(&id)
    }

    /// Condition by numeric id.
    #[must_use]
    pub fn condition(&self, id: i64) -> Option<&Condition> {
        self.conditions.get(&id)
    }

    /// Insert or overwrite a policy, returning its numeric id.
    pub fn insert_policy(&mut self, policy: Policy) -> AlertsResult<i64> {
        let id = parse_id("policy id", &policy.id)?;
        self.policies.insert(id, policy);
        Ok(id)
    }

    /// Rebuild the sorted policy id list from the policy map.
    pub fn refresh_policy_ids(&mut self) {
        let mut ids: Vec<i64> = self.policies.keys().copied().collect();
        ids.sort_unstable();
        self.policy_ids = ids;
    }

    /// Store a condition and link it into its owning policy.
    ///
    /// The policy id is validated before the condition id. A condition id
    /// seen again replaces the earlier record, moving it to the new policy
    /// if the owner changed.
    pub fn link_condition(&mut self, condition: Condition) -> AlertsResult<i64> {
        let policy_id = parse_id("condition policyId", &condition.policy_id)?;
        if !self.policies.contains_key(&policy_id) {
            return Err(AlertsError::OrphanCondition {
                condition_id: condition.id,
                policy_id: condition.policy_id,
            });
        }
        let id = parse_id("condition id", &condition.id)?;

        if let Some(previous) = self.conditions.insert(id, condition) {
            if let Ok(previous_policy) = parse_id("condition policyId", &previous.policy_id) {
                if previous_policy != policy_id {
                    if let Some(policy) = self.policies.get_mut(&previous_policy) {
                        policy.condition_ids.retain(|existing| *existing != id);
                    }
                }
            }
        }

        if let Some(policy) = self.policies.get_mut(&policy_id) {
            if let Err(pos) = policy.condition_ids.binary_search(&id) {
                policy.condition_ids.insert(pos, id);
            }
        }
        Ok(id)
    }

    /// Merge enrichment output into a condition. Returns `false` when the id
    /// is unknown.
    pub fn apply_detail(&mut self, id: i64, detail: ConditionDetail) -> bool {
        let Some(condition) = self.conditions.get_mut(&id) else {
            return false;
        };
        condition.query = detail.query;
        if detail.condition_type.is_some() {
            condition.condition_type = detail.condition_type;
        }
        if detail.enabled.is_some() {
            condition.enabled = detail.enabled;
        }
        true
    }

    /// Condition ids in export order: ascending policy, then ascending
    /// condition within the policy.
    #[must_use]
    pub fn condition_ids_in_order(&self) -> Vec<i64> {
        self.policies_in_order()
            .flat_map(|policy| policy.condition_ids.iter().copied())
            .collect()
    }

    /// Policies in ascending id order.
    pub fn policies_in_order(&self) -> impl Iterator<Item = &Policy> + '_ {
        self.policy_ids
            .iter()
            .filter_map(|id| self.policies.get(id))
    }

    /// Conditions of a policy in ascending id order.
    pub fn conditions_of<'a>(&'a self, policy: &'a Policy) -> impl Iterator<Item = &'a Condition> {
        policy
            .condition_ids
            .iter()
            .filter_map(|id| self.conditions.get(id))
    }

    /// `(policy, condition)` pairs in export order.
    pub fn rows(&self) -> impl Iterator<Item = (&Policy, &Condition)> + '_ {
        self.policies_in_order().flat_map(move |policy| {
            self.conditions_of(policy)
                .map(move |condition| (policy, condition))
        })
    }
}
