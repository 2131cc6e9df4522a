use crate::{
    collection::{Collection, CollectionLock, registry::KillSwitch},
    context::OperationContext,
    error::ExecutorError,
    executor::{ExecState, ExecutorId, PlanExecutor, YieldPolicy},
    stats::PlanSummaryStats,
};
use async_trait::async_trait;
use model::records::document::RawRecord;
use serde_json::json;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Full scan of an in-memory collection in insertion order, with an optional
/// top-level equality filter.
///
/// Reads records by position, so records inserted after EOF are picked up by
/// a later pull; tailable callers rely on that.
pub struct CollectionScan {
    id: ExecutorId,
    collection: Arc<Collection>,
    filter: Option<RawRecord>,
    yield_policy: YieldPolicy,
    kill: KillSwitch,
    op_ctx: Option<OperationContext>,
    position: usize,
    saved: bool,
    disposed: bool,

    docs_examined: u64,
    n_returned: u64,
    n_yields: u64,
    elapsed: Duration,
}

impl CollectionScan {
    /// Builds the scan and registers it with the collection's cursor registry.
    pub fn new(
        collection: &Arc<Collection>,
        op_ctx: OperationContext,
        filter: Option<RawRecord>,
        yield_policy: YieldPolicy,
    ) -> Self {
        let id = ExecutorId::new();
        let kill = collection.lock().registry_mut().register(id, yield_policy);
        debug!(executor = %id, collection = %collection.name(), "Registered collection scan");

        CollectionScan {
            id,
            collection: collection.clone(),
            filter: filter.filter(|f| !f.is_empty()),
            yield_policy,
            kill,
            op_ctx: Some(op_ctx),
            position: 0,
            saved: false,
            disposed: false,
            docs_examined: 0,
            n_returned: 0,
            n_yields: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn matches(&self, record: &RawRecord) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => filter
                .iter()
                .all(|(field, expected)| record.get(field) == Some(expected)),
        }
    }

    fn check_usable(&self) -> Result<(), ExecutorError> {
        if self.disposed {
            return Err(ExecutorError::Disposed(self.id));
        }
        if self.op_ctx.is_none() {
            return Err(ExecutorError::Detached(self.id));
        }
        Ok(())
    }
}

#[async_trait]
impl PlanExecutor for CollectionScan {
    fn id(&self) -> ExecutorId {
        self.id
    }

    fn namespace(&self) -> &str {
        self.collection.name()
    }

    fn yield_policy(&self) -> YieldPolicy {
        self.yield_policy
    }

    async fn get_next(&mut self) -> Result<ExecState, ExecutorError> {
        self.check_usable()?;
        if self.saved {
            return Err(ExecutorError::Failure(
                "get_next called on a saved executor".to_string(),
            ));
        }

        let started = Instant::now();
        let state = loop {
            let Some(record) = self.collection.record_at(self.position) else {
                break ExecState::Eof;
            };
            self.position += 1;
            self.docs_examined += 1;

            if self.matches(&record) {
                self.n_returned += 1;
                break ExecState::Advanced(record);
            }
        };
        self.elapsed += started.elapsed();

        Ok(state)
    }

    fn save_state(&mut self) {
        if self.disposed || self.saved {
            return;
        }
        self.saved = true;
        self.n_yields += 1;
    }

    fn restore_state(&mut self) -> Result<(), ExecutorError> {
        self.check_usable()?;
        if let Some(reason) = self.kill.reason() {
            return Err(ExecutorError::QueryPlanKilled(reason.to_string()));
        }
        self.saved = false;
        Ok(())
    }

    fn detach_from_operation_context(&mut self) {
        self.op_ctx = None;
    }

    fn reattach_to_operation_context(&mut self, op_ctx: OperationContext) {
        self.op_ctx = Some(op_ctx);
    }

    fn plan_summary(&self) -> String {
        "COLLSCAN".to_string()
    }

    fn summary_stats(&self) -> PlanSummaryStats {
        PlanSummaryStats {
            n_returned: self.n_returned,
            total_keys_examined: 0,
            total_docs_examined: self.docs_examined,
            execution_time_millis: self.elapsed.as_millis() as u64,
            n_yields: self.n_yields,
            ..Default::default()
        }
    }

    fn explain_plan(&self) -> serde_json::Value {
        let mut plan = json!({
            "stage": "COLLSCAN",
            "namespace": self.collection.name(),
            "direction": "forward",
        });
        if let Some(filter) = &self.filter {
            plan["filter"] = serde_json::Value::Object(filter.clone());
        }
        plan
    }

    fn dispose(&mut self, lock: &mut CollectionLock<'_>) {
        if self.disposed {
            return;
        }
        if !lock.registry_mut().deregister(&self.id) {
            warn!(executor = %self.id, collection = %lock.collection_name(), "Disposing unregistered executor");
        }
        self.disposed = true;
        self.op_ctx = None;
        debug!(executor = %self.id, docs_examined = self.docs_examined, "Collection scan disposed");
    }
}

impl Drop for CollectionScan {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        let collection = self.collection.clone();
        match collection.try_lock() {
            Some(mut lock) => {
                warn!(executor = %self.id, "Collection scan dropped without dispose");
                self.dispose(&mut lock);
            }
            None => warn!(executor = %self.id, "Collection scan leaked in cursor registry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn numbers(count: i64) -> Arc<Collection> {
        Collection::with_records(
            "numbers",
            (0..count)
                .map(|n| record(json!({ "n": n, "even": n % 2 == 0 })))
                .collect(),
        )
    }

    async fn drain(scan: &mut CollectionScan) -> Vec<RawRecord> {
        let mut out = Vec::new();
        while let ExecState::Advanced(r) = scan.get_next().await.unwrap() {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn test_scan_applies_equality_filter() {
        let coll = numbers(6);
        let filter = record(json!({ "even": true }));
        let mut scan =
            CollectionScan::new(&coll, OperationContext::new(), Some(filter), YieldPolicy::YieldAuto);

        let out = drain(&mut scan).await;
        assert_eq!(out.len(), 3);

        let stats = scan.summary_stats();
        assert_eq!(stats.n_returned, 3);
        assert_eq!(stats.total_docs_examined, 6);
        assert_eq!(scan.explain_plan()["filter"], json!({ "even": true }));

        scan.dispose(&mut coll.lock());
    }

    #[tokio::test]
    async fn test_registration_lifecycle() {
        let coll = numbers(1);
        let mut scan = CollectionScan::new(&coll, OperationContext::new(), None, YieldPolicy::YieldAuto);
        assert!(coll.lock().registry().yield_policy(&scan.id()).is_some());

        scan.dispose(&mut coll.lock());
        scan.dispose(&mut coll.lock());
        assert!(coll.lock().registry().is_empty());
        assert_eq!(
            scan.get_next().await.unwrap_err(),
            ExecutorError::Disposed(scan.id())
        );
    }

    #[tokio::test]
    async fn test_detached_scan_refuses_work() {
        let coll = numbers(2);
        let mut scan = CollectionScan::new(&coll, OperationContext::new(), None, YieldPolicy::YieldAuto);

        scan.detach_from_operation_context();
        assert_eq!(
            scan.get_next().await.unwrap_err(),
            ExecutorError::Detached(scan.id())
        );

        scan.reattach_to_operation_context(OperationContext::new());
        assert!(matches!(scan.get_next().await.unwrap(), ExecState::Advanced(_)));
        scan.dispose(&mut coll.lock());
    }

    #[tokio::test]
    async fn test_restore_after_drop_reports_kill() {
        let coll = numbers(3);
        let mut scan = CollectionScan::new(&coll, OperationContext::new(), None, YieldPolicy::YieldAuto);

        scan.save_state();
        assert!(scan.get_next().await.is_err());

        coll.drop_collection();
        assert!(matches!(
            scan.restore_state(),
            Err(ExecutorError::QueryPlanKilled(_))
        ));
        scan.dispose(&mut coll.lock());
    }

    #[tokio::test]
    async fn test_eof_then_new_records() {
        let coll = numbers(1);
        let mut scan = CollectionScan::new(&coll, OperationContext::new(), None, YieldPolicy::YieldAuto);

        assert_eq!(drain(&mut scan).await.len(), 1);
        coll.insert(record(json!({ "n": 99 })));
        assert_eq!(drain(&mut scan).await.len(), 1);
        scan.dispose(&mut coll.lock());
    }

    #[test]
    fn test_drop_without_dispose_deregisters() {
        let coll = numbers(1);
        {
            let _scan =
                CollectionScan::new(&coll, OperationContext::new(), None, YieldPolicy::YieldAuto);
        }
        assert!(coll.lock().registry().is_empty());
    }
}
