//! Policy, condition, and entity records.

use nrx_graphql::null_as_default;
use serde::{Deserialize, Serialize};

use crate::error::{AlertsError, AlertsResult};

/// Entity type accepted by the condition parser.
pub const CONDITION_ENTITY_TYPE: &str = "CONDITION";

/// Alert policy as returned by `policiesSearch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Server id, kept verbatim for output.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Policy name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Owning account.
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_id: i64,
    /// Incident grouping mode (`PER_POLICY`, `PER_CONDITION`, ...).
    #[serde(default, deserialize_with = "null_as_default")]
    pub incident_preference: String,
    /// Linked condition ids, ascending and unique.
    #[serde(skip)]
    pub condition_ids: Vec<i64>,
}

/// Alert condition assembled from an entity and its NRQL detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Server id, kept verbatim for output.
    pub id: String,
    /// Condition name.
    pub name: String,
    /// Entity GUID used for console deep links.
    pub guid: String,
    /// Owning account.
    pub account_id: i64,
    /// Owning policy id as sent by the server.
    pub policy_id: String,
    /// NRQL query; empty until enriched, and stays empty for non-NRQL
    /// conditions.
    #[serde(default)]
    pub query: String,
    /// NRQL condition type (`STATIC`, `BASELINE`, ...), when known.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<String>,
    /// Whether the condition is enabled, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Entity tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTag {
    /// Tag key.
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    /// Tag values.
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<String>,
}

/// Entity-search result record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Entity GUID.
    #[serde(default, deserialize_with = "null_as_default")]
    pub guid: String,
    /// Owning account.
    #[serde(default, deserialize_with = "null_as_default")]
    pub account_id: i64,
    /// Entity name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Entity type.
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub entity_type: String,
    /// Tags; the search filters them down to `id` and `policyId`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<EntityTag>,
}

impl TryFrom<&Entity> for Condition {
    type Error = AlertsError;

    /// Build a condition from a `CONDITION` entity carrying exactly the
    /// `id` and `policyId` tags, each with a single value.
    fn try_from(entity: &Entity) -> AlertsResult<Self> {
        let invalid = |reason: String| AlertsError::InvalidEntity {
            guid: entity.guid.clone(),
            reason,
        };

        if entity.entity_type != CONDITION_ENTITY_TYPE {
            return Err(invalid(format!("type {:?}", entity.entity_type)));
        }
        if entity.tags.len() != 2 {
            return Err(invalid(format!("{} tags, expected 2", entity.tags.len())));
        }

        let mut id = None;
        let mut policy_id = None;
        for tag in &entity.tags {
            let slot = match tag.key.as_str() {
                "id" => &mut id,
                "policyId" => &mut policy_id,
                _ => continue,
            };
            let [value] = tag.values.as_slice() else {
                return Err(invalid(format!(
                    "tag {} has {} values, expected 1",
                    tag.key,
                    tag.values.len()
                )));
            };
            *slot = Some(value.clone());
        }

        let id = id.ok_or_else(|| invalid("missing id tag".to_string()))?;
        let policy_id = policy_id.ok_or_else(|| invalid("missing policyId tag".to_string()))?;

        Ok(Self {
            id,
            name: entity.name.clone(),
            guid: entity.guid.clone(),
            account_id: entity.account_id,
            policy_id,
            ..Self::default()
        })
    }
}
