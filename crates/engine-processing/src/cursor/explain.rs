use chrono::{DateTime, Utc};
use engine_core::{executor::PlanExecutor, stats::PlanSummaryStats};
use model::query::explain::ExplainVerbosity;
use serde_json::{Map, Value, json};

/// Snapshot of the engine's plan description and statistics.
///
/// Sampled at construction and after every batch load, never live, so it
/// stays readable once the executor is gone.
#[derive(Debug, Clone, Default)]
pub struct PlanMetadata {
    plan_summary: String,
    winning_plan: Value,
    stats: PlanSummaryStats,
    sampled_at: Option<DateTime<Utc>>,
}

impl PlanMetadata {
    /// Plan description only; statistics stay empty until the first sample.
    pub fn describe(executor: &dyn PlanExecutor) -> Self {
        PlanMetadata {
            plan_summary: executor.plan_summary(),
            winning_plan: executor.explain_plan(),
            stats: PlanSummaryStats::default(),
            sampled_at: None,
        }
    }

    pub fn sample(&mut self, executor: &dyn PlanExecutor) {
        self.winning_plan = executor.explain_plan();
        self.stats = executor.summary_stats();
        self.sampled_at = Some(Utc::now());
    }

    pub fn plan_summary(&self) -> &str {
        &self.plan_summary
    }

    pub fn stats(&self) -> &PlanSummaryStats {
        &self.stats
    }

    pub fn sampled_at(&self) -> Option<DateTime<Utc>> {
        self.sampled_at
    }

    pub(crate) fn explain_fields(
        &self,
        namespace: &str,
        verbosity: ExplainVerbosity,
        out: &mut Map<String, Value>,
    ) {
        out.insert(
            "queryPlanner".to_string(),
            json!({
                "namespace": namespace,
                "planSummary": self.plan_summary,
                "winningPlan": self.winning_plan,
            }),
        );

        if !verbosity.includes_stats() {
            return;
        }

        let mut exec_stats = match self.stats.to_json() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        exec_stats.insert(
            "sampledAt".to_string(),
            self.sampled_at
                .map(|ts| Value::String(ts.to_rfc3339()))
                .unwrap_or(Value::Null),
        );
        out.insert("executionStats".to_string(), Value::Object(exec_stats));

        if verbosity == ExplainVerbosity::AllPlansExecution {
            // A single candidate plan; nothing was rejected.
            out.insert("allPlansExecution".to_string(), json!([]));
        }
    }
}
