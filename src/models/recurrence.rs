use serde::{Deserialize, Serialize};

use crate::models::task::RecurrenceFrequency;

/// Stored recurrence rule. Tasks reference it by id; occurrences are not expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRuleRecord {
    pub id: String,
    pub user_id: String,
    pub freq: RecurrenceFrequency,
    pub interval: u32,
    #[serde(default)]
    pub by_weekday: Option<Vec<u32>>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
    pub timezone: String,
    pub created_at: String,
}
