use crate::{
    collection::CollectionLock, context::OperationContext, error::ExecutorError,
    stats::PlanSummaryStats,
};
use async_trait::async_trait;
use model::{query::sort::SortPattern, records::document::RawRecord};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

pub mod scan;

/// Identity under which an executor is tracked in a collection's cursor registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ExecutorId(Uuid);

impl ExecutorId {
    pub fn new() -> Self {
        ExecutorId(Uuid::new_v4())
    }
}

impl Default for ExecutorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an executor gives up its locks between units of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldPolicy {
    YieldAuto,
    NoYield,
}

/// Outcome of a single pull.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecState {
    Advanced(RawRecord),
    Eof,
}

/// Contract of a query execution engine as consumed by pipeline stages.
///
/// Locking protocol: the caller brackets each run of `get_next` calls with
/// `restore_state` / `save_state`. Between `detach_from_operation_context`
/// and `reattach_to_operation_context` no other method may be called.
/// `dispose` is terminal and requires the collection lock.
#[async_trait]
pub trait PlanExecutor: Send {
    fn id(&self) -> ExecutorId;

    /// Name of the collection the plan reads from.
    fn namespace(&self) -> &str;

    fn yield_policy(&self) -> YieldPolicy;

    async fn get_next(&mut self) -> Result<ExecState, ExecutorError>;

    /// Prepares for a yield: the executor must not rely on any lock afterwards.
    fn save_state(&mut self);

    /// Resumes after a yield. Fails if the plan was invalidated meanwhile.
    fn restore_state(&mut self) -> Result<(), ExecutorError>;

    fn detach_from_operation_context(&mut self);

    fn reattach_to_operation_context(&mut self, op_ctx: OperationContext);

    /// One-line description of the winning plan, e.g. `COLLSCAN`.
    fn plan_summary(&self) -> String;

    fn summary_stats(&self) -> PlanSummaryStats;

    /// Structural description of the winning plan.
    fn explain_plan(&self) -> serde_json::Value;

    /// Sort orders the output is guaranteed to satisfy.
    fn output_sorts(&self) -> Vec<SortPattern> {
        Vec::new()
    }

    /// Deregisters from the collection's cursor registry and releases all
    /// executor state.
    fn dispose(&mut self, lock: &mut CollectionLock<'_>);
}
