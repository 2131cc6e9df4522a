#![allow(dead_code)]

use async_trait::async_trait;
use engine_core::{
    collection::{Collection, CollectionLock, registry::KillSwitch},
    context::OperationContext,
    error::ExecutorError,
    executor::{ExecState, ExecutorId, PlanExecutor, YieldPolicy},
    stats::PlanSummaryStats,
};
use model::{
    query::sort::{SortDirection, SortPattern},
    records::document::RawRecord,
};
use serde_json::json;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

/// One scripted response of a [`ScriptedExecutor`].
#[derive(Debug, Clone)]
pub enum Step {
    Record(RawRecord),
    Fail(String),
}

/// Counters shared between a [`ScriptedExecutor`] and the test driving it.
#[derive(Debug, Default)]
pub struct Probe {
    pub pulls: usize,
    pub saves: usize,
    pub restores: usize,
    pub disposed: bool,
    pub detached: bool,
}

pub type SharedProbe = Arc<Mutex<Probe>>;

/// Executor replaying a fixed script, used to inject engine faults and to
/// count how many records a cursor actually asked for.
pub struct ScriptedExecutor {
    id: ExecutorId,
    namespace: String,
    steps: VecDeque<Step>,
    kill: KillSwitch,
    probe: SharedProbe,
    yield_policy: YieldPolicy,
    output_sorts: Vec<SortPattern>,
    returned: u64,
}

impl ScriptedExecutor {
    /// Registers a new executor with `collection` and returns it along with
    /// its probe.
    pub fn register(collection: &Arc<Collection>, steps: Vec<Step>) -> (Self, SharedProbe) {
        Self::register_with_policy(collection, steps, YieldPolicy::YieldAuto)
    }

    pub fn register_with_policy(
        collection: &Arc<Collection>,
        steps: Vec<Step>,
        yield_policy: YieldPolicy,
    ) -> (Self, SharedProbe) {
        let id = ExecutorId::new();
        let kill = collection.lock().registry_mut().register(id, yield_policy);
        let probe = SharedProbe::default();

        let executor = ScriptedExecutor {
            id,
            namespace: collection.name().to_string(),
            steps: steps.into(),
            kill,
            probe: probe.clone(),
            yield_policy,
            output_sorts: Vec::new(),
            returned: 0,
        };
        (executor, probe)
    }

    pub fn sorted_by(mut self, field: &str) -> Self {
        self.output_sorts = vec![SortPattern::new().then(field, SortDirection::Ascending)];
        self
    }

    fn probe(&self) -> std::sync::MutexGuard<'_, Probe> {
        self.probe.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PlanExecutor for ScriptedExecutor {
    fn id(&self) -> ExecutorId {
        self.id
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn yield_policy(&self) -> YieldPolicy {
        self.yield_policy
    }

    async fn get_next(&mut self) -> Result<ExecState, ExecutorError> {
        {
            let mut probe = self.probe();
            if probe.disposed {
                return Err(ExecutorError::Disposed(self.id));
            }
            probe.pulls += 1;
        }

        match self.steps.pop_front() {
            Some(Step::Record(record)) => {
                self.returned += 1;
                Ok(ExecState::Advanced(record))
            }
            Some(Step::Fail(reason)) => Err(ExecutorError::Failure(reason)),
            None => Ok(ExecState::Eof),
        }
    }

    fn save_state(&mut self) {
        self.probe().saves += 1;
    }

    fn restore_state(&mut self) -> Result<(), ExecutorError> {
        self.probe().restores += 1;
        match self.kill.reason() {
            Some(reason) => Err(ExecutorError::QueryPlanKilled(reason.to_string())),
            None => Ok(()),
        }
    }

    fn detach_from_operation_context(&mut self) {
        self.probe().detached = true;
    }

    fn reattach_to_operation_context(&mut self, _op_ctx: OperationContext) {
        self.probe().detached = false;
    }

    fn plan_summary(&self) -> String {
        "SCRIPTED".to_string()
    }

    fn summary_stats(&self) -> PlanSummaryStats {
        PlanSummaryStats {
            n_returned: self.returned,
            total_docs_examined: self.returned,
            ..Default::default()
        }
    }

    fn explain_plan(&self) -> serde_json::Value {
        json!({ "stage": "SCRIPTED", "remaining": self.steps.len() })
    }

    fn output_sorts(&self) -> Vec<SortPattern> {
        self.output_sorts.clone()
    }

    fn dispose(&mut self, lock: &mut CollectionLock<'_>) {
        let mut probe = self.probe.lock().unwrap_or_else(|e| e.into_inner());
        if probe.disposed {
            return;
        }
        lock.registry_mut().deregister(&self.id);
        probe.disposed = true;
    }
}

/// Script yielding one record per name, `{pos, name}`.
pub fn records(names: &[&str]) -> Vec<Step> {
    names
        .iter()
        .enumerate()
        .map(|(pos, name)| Step::Record(crate::record(json!({ "pos": pos, "name": name }))))
        .collect()
}

/// Drains a cursor, returning the `name` of every document it produced.
pub async fn drain_names(
    stage: &mut engine_processing::cursor::CursorStage,
) -> Result<Vec<String>, engine_processing::error::StageError> {
    use engine_processing::stage::GetNextResult;

    let mut out = Vec::new();
    while let GetNextResult::Advanced(doc) = stage.produce_next().await? {
        out.push(
            doc.get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        );
    }
    Ok(out)
}
