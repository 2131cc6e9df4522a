use crate::{
    cursor::{config::CursorConfig, explain::PlanMetadata, handle::CursorResources},
    error::StageError,
};
use engine_core::{
    context::ExpressionContext,
    executor::{ExecState, PlanExecutor},
};
use model::{
    query::deps::ParsedDeps,
    records::{
        batch::Batch,
        document::{Document, RawRecord},
    },
};
use tracing::{debug, warn};

/// Why a batch load stopped pulling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A batch threshold was hit; the executor was saved for a later load.
    Yielded,
    /// Tailable EOF: nothing more right now, but the executor stays alive.
    AwaitingData,
    /// The engine ran dry; resources were disposed.
    Exhausted,
    /// The cumulative limit was reached; resources were disposed.
    LimitReached,
}

enum PullEnd {
    Outcome(LoadOutcome),
    Failed(StageError),
}

/// Fills a cursor stage's batch from its executor.
///
/// Holds the per-cursor conversion policy and the running count used to
/// enforce a limit across loads.
#[derive(Debug)]
pub struct BatchLoader {
    config: CursorConfig,
    produce_empty_docs: bool,
    dependencies: Option<ParsedDeps>,
    docs_added: u64,
}

impl BatchLoader {
    pub fn new(config: CursorConfig) -> Self {
        BatchLoader {
            config,
            produce_empty_docs: false,
            dependencies: None,
            docs_added: 0,
        }
    }

    pub(crate) fn set_produce_empty_docs(&mut self) {
        self.produce_empty_docs = true;
    }

    pub(crate) fn set_dependencies(&mut self, deps: Option<ParsedDeps>) {
        self.dependencies = deps;
    }

    /// Documents added to batches so far, across all loads.
    pub fn docs_added(&self) -> u64 {
        self.docs_added
    }

    fn convert(&self, raw: &RawRecord) -> Document {
        if self.produce_empty_docs {
            Document::empty()
        } else if let Some(deps) = &self.dependencies {
            deps.extract_fields(raw)
        } else {
            Document::from_raw(raw)
        }
    }

    /// Pulls one batch into `batch`, which must be empty.
    ///
    /// On exhaustion, limit satisfaction or engine failure the resources are
    /// disposed before returning; documents already pulled stay in `batch`.
    /// Statistics are sampled into `metadata` after every pull.
    pub async fn load(
        &mut self,
        resources: &mut Option<CursorResources>,
        batch: &mut Batch,
        limit: Option<u64>,
        exp_ctx: &ExpressionContext,
        metadata: &mut PlanMetadata,
    ) -> Result<LoadOutcome, StageError> {
        debug_assert!(batch.is_empty(), "batch refilled while non-empty");

        let Some(res) = resources.as_mut() else {
            return Ok(LoadOutcome::Exhausted);
        };
        let namespace = res.handle.executor().namespace().to_string();

        if limit.is_some_and(|limit| self.docs_added >= limit) {
            dispose(resources);
            return Ok(LoadOutcome::LimitReached);
        }

        let executor = res.handle.executor_mut()?;
        let end = match executor.restore_state() {
            Ok(()) => self.pull(executor, batch, limit, exp_ctx).await,
            Err(source) => PullEnd::Failed(StageError::QueryExecution {
                namespace: namespace.clone(),
                source,
            }),
        };
        metadata.sample(executor);

        debug!(
            namespace = %namespace,
            records = batch.len(),
            bytes = batch.size_bytes(),
            docs_added = self.docs_added,
            "Loaded batch"
        );

        match end {
            PullEnd::Outcome(outcome @ (LoadOutcome::Yielded | LoadOutcome::AwaitingData)) => {
                executor.save_state();
                Ok(outcome)
            }
            PullEnd::Outcome(outcome) => {
                dispose(resources);
                Ok(outcome)
            }
            PullEnd::Failed(err) => {
                warn!(namespace = %namespace, error = %err, pulled = batch.len(), "Batch load failed");
                dispose(resources);
                Err(err)
            }
        }
    }

    async fn pull(
        &mut self,
        executor: &mut dyn PlanExecutor,
        batch: &mut Batch,
        limit: Option<u64>,
        exp_ctx: &ExpressionContext,
    ) -> PullEnd {
        let namespace = executor.namespace().to_string();
        let mut pulled = 0usize;

        loop {
            match executor.get_next().await {
                Ok(ExecState::Advanced(raw)) => {
                    batch.push(self.convert(&raw));
                    pulled += 1;
                    self.docs_added += 1;

                    if limit.is_some_and(|limit| self.docs_added >= limit) {
                        return PullEnd::Outcome(LoadOutcome::LimitReached);
                    }
                    // Awaiting data: every document goes downstream on its own.
                    if exp_ctx.is_tailable_await_data()
                        || pulled >= self.config.max_batch_records
                        || batch.size_bytes() > self.config.batch_size_bytes
                    {
                        return PullEnd::Outcome(LoadOutcome::Yielded);
                    }
                }
                Ok(ExecState::Eof) if exp_ctx.is_tailable() => {
                    return PullEnd::Outcome(LoadOutcome::AwaitingData);
                }
                Ok(ExecState::Eof) => return PullEnd::Outcome(LoadOutcome::Exhausted),
                Err(source) => {
                    return PullEnd::Failed(StageError::QueryExecution { namespace, source });
                }
            }
        }
    }
}

fn dispose(resources: &mut Option<CursorResources>) {
    if let Some(res) = resources.take() {
        res.dispose();
    }
}
