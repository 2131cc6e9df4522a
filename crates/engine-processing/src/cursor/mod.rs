use crate::{
    cursor::{
        config::CursorConfig,
        explain::PlanMetadata,
        handle::{CursorResources, ExecutionHandle, HandleState},
        loader::{BatchLoader, LoadOutcome},
        shape::QueryShape,
    },
    error::StageError,
    limit::LimitStage,
    stage::{GetNextResult, Optimization, Stage, Upstream},
};
use async_trait::async_trait;
use engine_core::{
    collection::{Collection, range::RangePreserver},
    context::{ExpressionContext, OperationContext},
    executor::{PlanExecutor, YieldPolicy},
    stats::PlanSummaryStats,
};
use model::{
    query::{explain::ExplainVerbosity, sort::SortPattern},
    records::batch::Batch,
};
use serde_json::{Map, Value};
use std::{any::Any, sync::Arc};
use tracing::{debug, info, warn};

pub mod config;
pub mod explain;
pub mod handle;
pub mod loader;
pub mod shape;

/// Lifecycle of a cursor stage as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Active,
    Detached,
    Disposed,
}

/// Initial pipeline stage that serves documents produced by a [`PlanExecutor`].
///
/// Documents are pulled from the executor in batches so that its locks are
/// taken once per batch rather than once per document. The stage owns the
/// executor and the range pin that keeps its input alive, and releases both
/// together on exhaustion, on error, or when disposed.
pub struct CursorStage {
    namespace: String,
    exp_ctx: ExpressionContext,
    batch: Batch,
    loader: BatchLoader,
    resources: Option<CursorResources>,

    limit: Option<u64>,
    shape: Option<QueryShape>,
    metadata: PlanMetadata,
    output_sorts: Vec<SortPattern>,

    /// Engine failure held back until the documents pulled before it are drained.
    pending_error: Option<StageError>,
    execution_started: bool,
}

impl CursorStage {
    /// Wraps `executor`, which must be a yielding executor registered with
    /// `collection`'s cursor registry.
    ///
    /// On failure the executor has already been released.
    pub fn create(
        collection: &Arc<Collection>,
        mut executor: Box<dyn PlanExecutor>,
        exp_ctx: ExpressionContext,
        config: CursorConfig,
    ) -> Result<Self, StageError> {
        let namespace = executor.namespace().to_string();

        // Disposal needs the executor's own collection lock; dropping it
        // deregisters it there instead.
        if namespace != collection.name() {
            return Err(StageError::InvalidState(format!(
                "executor reads '{namespace}' but the cursor is bound to '{}'",
                collection.name()
            )));
        }

        {
            let mut lock = collection.lock();
            let problem = match lock.registry().yield_policy(&executor.id()) {
                None => Some(format!("executor {} is not registered", executor.id())),
                Some(YieldPolicy::YieldAuto) if executor.yield_policy() == YieldPolicy::YieldAuto => {
                    None
                }
                Some(_) => Some("cursor stage requires a yielding executor".to_string()),
            };

            if let Some(message) = problem {
                executor.dispose(&mut lock);
                return Err(StageError::InvalidState(message));
            }
        }

        let range = match RangePreserver::acquire(collection) {
            Ok(range) => range,
            Err(source) => {
                warn!(namespace = %namespace, error = %source, "Failed to pin collection range");
                executor.dispose(&mut collection.lock());
                return Err(StageError::ResourceAcquisition { namespace, source });
            }
        };

        let mut metadata = PlanMetadata::describe(executor.as_ref());
        if exp_ctx.explain.is_some() {
            metadata.sample(executor.as_ref());
        }
        let output_sorts = executor.output_sorts();

        info!(
            namespace = %namespace,
            executor = %executor.id(),
            plan = %metadata.plan_summary(),
            "Cursor stage created"
        );

        Ok(CursorStage {
            namespace,
            exp_ctx,
            batch: Batch::new(),
            loader: BatchLoader::new(config),
            resources: Some(CursorResources::new(ExecutionHandle::new(executor), range)),
            limit: None,
            shape: None,
            metadata,
            output_sorts,
            pending_error: None,
            execution_started: false,
        })
    }

    /// Records the query shape pushed down to the engine. Allowed once, and
    /// only before the first document is requested.
    pub fn record_query_shape(&mut self, shape: QueryShape) -> Result<(), StageError> {
        if self.shape.is_some() {
            return Err(StageError::invalid_state("query shape already recorded"));
        }
        self.ensure_not_started("record the query shape")?;

        self.loader.set_dependencies(shape.dependencies().cloned());
        self.shape = Some(shape);
        Ok(())
    }

    /// Switches to emitting empty placeholder documents, for pipelines that
    /// need no fields from the cursor. Irreversible; only allowed before the
    /// first document is requested.
    pub fn should_produce_empty_docs(&mut self) -> Result<(), StageError> {
        self.ensure_not_started("switch to empty documents")?;
        self.loader.set_produce_empty_docs();
        Ok(())
    }

    fn ensure_not_started(&self, action: &str) -> Result<(), StageError> {
        if self.execution_started {
            return Err(StageError::invalid_state(format!(
                "cannot {action} after execution has started"
            )));
        }
        Ok(())
    }

    /// Next document, loading a batch when the buffer is empty. A load failure
    /// is returned once the documents pulled before it are drained; after
    /// disposal or exhaustion this is EOF forever.
    pub async fn produce_next(&mut self) -> Result<GetNextResult, StageError> {
        if let Some(doc) = self.batch.pop_front() {
            return Ok(GetNextResult::Advanced(doc));
        }
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }

        let Some(resources) = &self.resources else {
            return Ok(GetNextResult::Eof);
        };
        if resources.handle.state() == HandleState::Detached {
            return Err(StageError::invalid_state(
                "cannot load a batch while detached from the operation context",
            ));
        }

        self.execution_started = true;
        let loaded = self
            .loader
            .load(
                &mut self.resources,
                &mut self.batch,
                self.limit,
                &self.exp_ctx,
                &mut self.metadata,
            )
            .await;

        match loaded {
            Ok(outcome) => {
                if self.batch.is_empty() && outcome != LoadOutcome::AwaitingData {
                    self.release_resources();
                }
            }
            Err(err) if self.batch.is_empty() => return Err(err),
            Err(err) => self.pending_error = Some(err),
        }

        Ok(match self.batch.pop_front() {
            Some(doc) => GetNextResult::Advanced(doc),
            None => GetNextResult::Eof,
        })
    }

    /// Releases the executor and range pin, keeping buffered documents.
    fn release_resources(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.dispose();
            debug!(
                namespace = %self.namespace,
                docs_added = self.docs_added(),
                "Cursor resources released"
            );
        }
    }

    pub fn state(&self) -> CursorState {
        match &self.resources {
            None => CursorState::Disposed,
            Some(res) => match res.handle.state() {
                HandleState::Active => CursorState::Active,
                HandleState::Detached => CursorState::Detached,
            },
        }
    }

    /// Effective limit, or `-1` when there is none. Limits beyond `i64::MAX`
    /// saturate.
    pub fn limit(&self) -> i64 {
        self.limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX))
    }

    pub fn plan_summary(&self) -> &str {
        self.metadata.plan_summary()
    }

    pub fn plan_summary_stats(&self) -> &PlanSummaryStats {
        self.metadata.stats()
    }

    pub fn output_sorts(&self) -> &[SortPattern] {
        &self.output_sorts
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Documents pulled from the engine so far, counted against the limit.
    pub fn docs_added(&self) -> u64 {
        self.loader.docs_added()
    }

    /// Documents currently buffered and not yet returned.
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }
}

#[async_trait]
impl Stage for CursorStage {
    fn source_name(&self) -> &'static str {
        "$cursor"
    }

    async fn get_next(&mut self, _upstream: &mut Upstream<'_>) -> Result<GetNextResult, StageError> {
        self.produce_next().await
    }

    /// Only rendered for explain; a cursor cannot be re-parsed from its
    /// serialized form.
    fn serialize(&self, explain: Option<ExplainVerbosity>) -> Option<Value> {
        let verbosity = explain?;

        let mut out = Map::new();
        if let Some(shape) = &self.shape {
            shape.explain_fields(&mut out);
        }
        if let Some(limit) = self.limit {
            out.insert("limit".to_string(), Value::from(limit));
        }
        self.metadata
            .explain_fields(&self.namespace, verbosity, &mut out);

        let mut stage = Map::new();
        stage.insert(self.source_name().to_string(), Value::Object(out));
        Some(Value::Object(stage))
    }

    /// Absorbs an immediately following `$limit`, so the executor can stop as
    /// soon as the bound is met.
    fn optimize_at(&mut self, next: Option<&dyn Stage>) -> Optimization {
        let Some(next_limit) = next.and_then(|s| s.as_any().downcast_ref::<LimitStage>()) else {
            return Optimization::Unchanged;
        };

        let limit = match self.limit {
            Some(current) => current.min(next_limit.limit()),
            None => next_limit.limit(),
        };
        self.limit = Some(limit);

        info!(namespace = %self.namespace, limit, "Fused $limit into cursor");
        Optimization::RemoveNext
    }

    fn is_valid_initial_source(&self) -> bool {
        true
    }

    /// Releases the engine and drops any buffered documents. Idempotent.
    fn dispose(&mut self) {
        self.batch.clear();
        self.pending_error = None;
        self.release_resources();
    }

    fn detach_from_operation_context(&mut self) {
        if let Some(res) = &mut self.resources
            && res.handle.detach()
        {
            debug!(namespace = %self.namespace, "Cursor detached");
        }
    }

    fn reattach_to_operation_context(&mut self, op_ctx: OperationContext) -> Result<(), StageError> {
        let Some(res) = &mut self.resources else {
            return Err(StageError::invalid_state(
                "cannot reattach a disposed cursor",
            ));
        };
        if res.handle.reattach(op_ctx) {
            debug!(namespace = %self.namespace, op_id = op_ctx.op_id(), "Cursor reattached");
        }
        self.exp_ctx.op_ctx = op_ctx;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for CursorStage {
    fn drop(&mut self) {
        self.release_resources();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::executor::scan::CollectionScan;
    use model::records::document::RawRecord;
    use serde_json::json;
    use std::num::NonZeroU64;
    use tracing_test::traced_test;

    fn letters(names: &[&str]) -> Arc<Collection> {
        Collection::with_records(
            "db.letters",
            names
                .iter()
                .enumerate()
                .map(|(i, name)| record(json!({ "pos": i, "name": name, "extra": "x" })))
                .collect(),
        )
    }

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn cursor(coll: &Arc<Collection>, exp_ctx: ExpressionContext) -> CursorStage {
        let scan = CollectionScan::new(coll, exp_ctx.op_ctx, None, YieldPolicy::YieldAuto);
        CursorStage::create(coll, Box::new(scan), exp_ctx, CursorConfig::default()).unwrap()
    }

    async fn names(stage: &mut CursorStage) -> Vec<String> {
        let mut out = Vec::new();
        while let GetNextResult::Advanced(doc) = stage.produce_next().await.unwrap() {
            out.push(doc.get("name").and_then(|v| v.as_str()).unwrap().to_string());
        }
        out
    }

    #[tokio::test]
    async fn test_cursor_drains_and_releases() {
        let coll = letters(&["a", "b", "c"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));
        assert_eq!(coll.lock().range_pins(), 1);

        assert_eq!(names(&mut stage).await, vec!["a", "b", "c"]);
        assert_eq!(stage.state(), CursorState::Disposed);
        assert!(stage.produce_next().await.unwrap().is_eof());

        let lock = coll.lock();
        assert_eq!(lock.range_pins(), 0);
        assert!(lock.registry().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_fused_limit_stops_early() {
        let coll = letters(&["a", "b", "c", "d", "e"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));

        let two = LimitStage::new(NonZeroU64::new(2).unwrap());
        assert_eq!(stage.optimize_at(Some(&two)), Optimization::RemoveNext);
        let four = LimitStage::new(NonZeroU64::new(4).unwrap());
        assert_eq!(stage.optimize_at(Some(&four)), Optimization::RemoveNext);
        assert_eq!(stage.limit(), 2);

        assert_eq!(names(&mut stage).await, vec!["a", "b"]);
        assert_eq!(stage.plan_summary_stats().total_docs_examined, 2);
        assert_eq!(stage.docs_added(), 2);
        assert_eq!(stage.state(), CursorState::Disposed);
        assert!(logs_contain("Fused $limit into cursor"));
        assert!(logs_contain("Execution handle disposed"));
    }

    #[test]
    fn test_huge_limit_saturates_instead_of_reading_unlimited() {
        let coll = letters(&["a"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));

        let huge = LimitStage::new(NonZeroU64::MAX);
        assert_eq!(stage.optimize_at(Some(&huge)), Optimization::RemoveNext);
        assert_eq!(stage.limit(), i64::MAX);

        let past_signed = LimitStage::new(NonZeroU64::new(i64::MAX as u64 + 1).unwrap());
        stage.optimize_at(Some(&past_signed));
        assert_eq!(stage.limit(), i64::MAX);
    }

    #[test]
    fn test_limit_unset_reports_minus_one() {
        let coll = letters(&["a"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));
        assert_eq!(stage.limit(), -1);
        assert_eq!(stage.optimize_at(None), Optimization::Unchanged);
        assert_eq!(stage.source_name(), "$cursor");
        assert!(stage.is_valid_initial_source());
    }

    #[tokio::test]
    async fn test_projection_dependencies_trim_documents() {
        let coll = letters(&["a"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));
        let shape = QueryShape::builder()
            .projection(
                json!({ "name": 1 }),
                Some(model::query::deps::ParsedDeps::new(["name"])),
            )
            .build();
        stage.record_query_shape(shape.clone()).unwrap();
        assert!(stage.record_query_shape(shape).is_err());

        let doc = stage.produce_next().await.unwrap().into_document().unwrap();
        assert_eq!(doc.len(), 1);
        assert!(doc.get("extra").is_none());
    }

    #[tokio::test]
    async fn test_settings_refused_after_start() {
        let coll = letters(&["a", "b"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));
        stage.should_produce_empty_docs().unwrap();

        let doc = stage.produce_next().await.unwrap().into_document().unwrap();
        assert!(doc.is_empty());

        assert!(matches!(
            stage.should_produce_empty_docs(),
            Err(StageError::InvalidState(_))
        ));
        assert!(matches!(
            stage.record_query_shape(QueryShape::default()),
            Err(StageError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_detached_cursor_refuses_load() {
        let coll = letters(&["a"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));

        stage.detach_from_operation_context();
        assert_eq!(stage.state(), CursorState::Detached);
        assert!(matches!(
            stage.produce_next().await,
            Err(StageError::InvalidState(_))
        ));

        stage
            .reattach_to_operation_context(OperationContext::new())
            .unwrap();
        assert_eq!(names(&mut stage).await, vec!["a"]);
        assert!(
            stage
                .reattach_to_operation_context(OperationContext::new())
                .is_err()
        );
    }

    #[test]
    fn test_create_rejects_foreign_executor() {
        let coll = letters(&["a"]);
        let other = Collection::with_records("db.other", vec![]);
        let scan = CollectionScan::new(&other, OperationContext::new(), None, YieldPolicy::YieldAuto);

        let err = CursorStage::create(
            &coll,
            Box::new(scan),
            ExpressionContext::new(OperationContext::new()),
            CursorConfig::default(),
        )
        .err()
        .unwrap();

        assert!(matches!(err, StageError::InvalidState(_)));
        assert!(other.lock().registry().is_empty());
        assert_eq!(coll.lock().range_pins(), 0);
    }

    #[test]
    fn test_create_rejects_non_yielding_executor() {
        let coll = letters(&["a"]);
        let scan = CollectionScan::new(&coll, OperationContext::new(), None, YieldPolicy::NoYield);

        let result = CursorStage::create(
            &coll,
            Box::new(scan),
            ExpressionContext::new(OperationContext::new()),
            CursorConfig::default(),
        );

        assert!(matches!(result, Err(StageError::InvalidState(_))));
        assert!(coll.lock().registry().is_empty());
    }

    #[tokio::test]
    async fn test_serialize_only_for_explain() {
        let coll = letters(&["a", "b"]);
        let exp_ctx = ExpressionContext::new(OperationContext::new())
            .with_explain(ExplainVerbosity::ExecutionStats);
        let mut stage = cursor(&coll, exp_ctx);
        stage
            .record_query_shape(QueryShape::builder().query(json!({ "pos": 1 })).build())
            .unwrap();

        assert!(stage.serialize(None).is_none());

        names(&mut stage).await;
        let explained = stage.serialize(Some(ExplainVerbosity::ExecutionStats)).unwrap();
        let body = &explained["$cursor"];
        assert_eq!(body["query"], json!({ "pos": 1 }));
        assert_eq!(body["queryPlanner"]["namespace"], json!("db.letters"));
        assert_eq!(body["queryPlanner"]["planSummary"], json!("COLLSCAN"));
        assert_eq!(body["executionStats"]["nReturned"], json!(2));

        let planner_only = stage.serialize(Some(ExplainVerbosity::QueryPlanner)).unwrap();
        assert!(planner_only["$cursor"].get("executionStats").is_none());
    }

    #[tokio::test]
    async fn test_dispose_discards_buffer() {
        let coll = letters(&["a", "b", "c"]);
        let mut stage = cursor(&coll, ExpressionContext::new(OperationContext::new()));

        assert!(!stage.produce_next().await.unwrap().is_eof());
        stage.dispose();
        stage.dispose();

        assert_eq!(stage.buffered(), 0);
        assert!(stage.produce_next().await.unwrap().is_eof());
        assert_eq!(coll.lock().range_pins(), 0);
    }
}
