use crate::{
    error::StageError,
    stage::{GetNextResult, Optimization, Stage, Upstream},
};
use engine_core::context::OperationContext;
use model::query::explain::ExplainVerbosity;
use tracing::{debug, info};

pub trait PipelineExt {
    fn add_if<T, F>(self, condition: bool, factory: F) -> Self
    where
        T: Stage + 'static,
        F: FnOnce() -> T;
}

/// Ordered stages, first one being the source.
///
/// The pipeline is the sole owner of its stages. Optimization passes walk the
/// stage list by index and let each stage decide about its successor.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline { stages: Vec::new() }
    }

    pub fn add_stage<T: Stage + 'static>(mut self, stage: T) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn validate(&self) -> Result<(), StageError> {
        match self.stages.first() {
            Some(first) if !first.is_valid_initial_source() => Err(StageError::invalid_state(
                format!("{} is not a valid initial source", first.source_name()),
            )),
            _ => Ok(()),
        }
    }

    /// Runs `optimize_at` over every position until the stage list settles.
    pub fn optimize(&mut self) {
        let mut idx = 0;
        while idx < self.stages.len() {
            let (head, tail) = self.stages.split_at_mut(idx + 1);
            let next = tail.first().map(|s| s.as_ref());

            match head[idx].optimize_at(next) {
                Optimization::RemoveNext => {
                    let mut removed = self.stages.remove(idx + 1);
                    debug!(
                        position = idx,
                        removed = removed.source_name(),
                        "Stage absorbed by predecessor"
                    );
                    removed.dispose();
                }
                Optimization::Unchanged => idx += 1,
            }
        }
        info!(stages = ?self.stage_names(), "Pipeline optimized");
    }

    pub async fn get_next(&mut self) -> Result<GetNextResult, StageError> {
        Upstream::new(&mut self.stages).next().await
    }

    /// Serializes every stage that has something to show at this level.
    pub fn serialize(&self, explain: Option<ExplainVerbosity>) -> Vec<serde_json::Value> {
        self.stages
            .iter()
            .filter_map(|s| s.serialize(explain))
            .collect()
    }

    pub fn dispose(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.dispose();
        }
    }

    pub fn detach_from_operation_context(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.detach_from_operation_context();
        }
    }

    pub fn reattach_to_operation_context(&mut self, op_ctx: OperationContext) -> Result<(), StageError> {
        for stage in self.stages.iter_mut() {
            stage.reattach_to_operation_context(op_ctx)?;
        }
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.source_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Typed view of the stage at `idx`.
    pub fn stage_as<T: Stage + 'static>(&self, idx: usize) -> Option<&T> {
        self.stages.get(idx)?.as_any().downcast_ref::<T>()
    }
}

impl PipelineExt for Pipeline {
    fn add_if<T, F>(mut self, condition: bool, factory: F) -> Self
    where
        T: Stage + 'static,
        F: FnOnce() -> T,
    {
        if condition {
            self = self.add_stage(factory());
        }
        self
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limit::LimitStage;
    use async_trait::async_trait;
    use model::records::document::Document;
    use std::{any::Any, num::NonZeroU64};

    /// Emits `n` documents `{i: 0..n}`.
    struct CountingSource {
        next: i64,
        end: i64,
        disposed: bool,
    }

    impl CountingSource {
        fn new(end: i64) -> Self {
            Self {
                next: 0,
                end,
                disposed: false,
            }
        }
    }

    #[async_trait]
    impl Stage for CountingSource {
        fn source_name(&self) -> &'static str {
            "$counting"
        }

        async fn get_next(&mut self, _upstream: &mut Upstream<'_>) -> Result<GetNextResult, StageError> {
            if self.disposed || self.next >= self.end {
                return Ok(GetNextResult::Eof);
            }
            let doc = Document::from_fields([("i", self.next)]);
            self.next += 1;
            Ok(GetNextResult::Advanced(doc))
        }

        fn serialize(&self, _explain: Option<ExplainVerbosity>) -> Option<serde_json::Value> {
            None
        }

        fn is_valid_initial_source(&self) -> bool {
            true
        }

        fn dispose(&mut self) {
            self.disposed = true;
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn limit(n: u64) -> LimitStage {
        LimitStage::new(NonZeroU64::new(n).unwrap())
    }

    #[tokio::test]
    async fn test_limit_pulls_from_source() {
        let mut pipeline = Pipeline::new()
            .add_stage(CountingSource::new(10))
            .add_stage(limit(3));

        let mut seen = Vec::new();
        while let GetNextResult::Advanced(doc) = pipeline.get_next().await.unwrap() {
            seen.push(doc.get("i").and_then(|v| v.as_i64()).unwrap());
        }

        assert_eq!(seen, vec![0, 1, 2]);
        assert!(
            pipeline
                .stage_as::<CountingSource>(0)
                .is_some_and(|s| s.disposed)
        );
    }

    #[test]
    fn test_optimize_collapses_chained_limits() {
        let mut pipeline = Pipeline::new()
            .add_stage(CountingSource::new(10))
            .add_stage(limit(5))
            .add_stage(limit(2))
            .add_stage(limit(7));

        pipeline.optimize();

        assert_eq!(pipeline.stage_names(), vec!["$counting", "$limit"]);
        assert_eq!(pipeline.stage_as::<LimitStage>(1).map(|l| l.limit()), Some(2));
        assert_eq!(pipeline.serialize(None).len(), 1);
    }

    #[test]
    fn test_validate_requires_initial_source() {
        let pipeline = Pipeline::new().add_stage(limit(1));
        assert!(matches!(
            pipeline.validate(),
            Err(StageError::InvalidState(_))
        ));

        let pipeline = Pipeline::new().add_if(true, || CountingSource::new(1));
        assert!(pipeline.validate().is_ok());
    }
}
