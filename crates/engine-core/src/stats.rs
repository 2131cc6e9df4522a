use serde::Serialize;
use std::collections::BTreeSet;

/// Numeric summary of a plan's execution so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummaryStats {
    pub n_returned: u64,
    pub total_keys_examined: u64,
    pub total_docs_examined: u64,
    pub execution_time_millis: u64,
    pub n_yields: u64,
    pub indexes_used: BTreeSet<String>,
    pub has_sort_stage: bool,
    pub from_multi_planner: bool,
    pub replanned: bool,
}

impl PlanSummaryStats {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
