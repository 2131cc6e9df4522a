use crate::error::StageError;
use async_trait::async_trait;
use engine_core::context::OperationContext;
use model::{query::explain::ExplainVerbosity, records::document::Document};
use std::any::Any;

#[derive(Debug, Clone, PartialEq)]
pub enum GetNextResult {
    Advanced(Document),
    Eof,
}

impl GetNextResult {
    pub fn is_eof(&self) -> bool {
        matches!(self, GetNextResult::Eof)
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            GetNextResult::Advanced(doc) => Some(doc),
            GetNextResult::Eof => None,
        }
    }
}

/// What an optimization pass decided about the stage after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimization {
    Unchanged,
    /// The next stage was absorbed and must be removed; the current position
    /// is then optimized again against its new neighbour.
    RemoveNext,
}

/// A single step of a document pipeline.
#[async_trait]
pub trait Stage: Send {
    fn source_name(&self) -> &'static str;

    /// Pulls the next document, reading from `upstream` if the stage needs input.
    async fn get_next(&mut self, upstream: &mut Upstream<'_>) -> Result<GetNextResult, StageError>;

    /// Serialized form of the stage. `None` when the stage has nothing to
    /// show at the requested level.
    fn serialize(&self, explain: Option<ExplainVerbosity>) -> Option<serde_json::Value>;

    fn optimize_at(&mut self, _next: Option<&dyn Stage>) -> Optimization {
        Optimization::Unchanged
    }

    fn is_valid_initial_source(&self) -> bool {
        false
    }

    /// Releases any resources the stage holds. Must be idempotent.
    fn dispose(&mut self) {}

    fn detach_from_operation_context(&mut self) {}

    fn reattach_to_operation_context(&mut self, _op_ctx: OperationContext) -> Result<(), StageError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// The stages before the one currently pulling, last one nearest.
pub struct Upstream<'a> {
    stages: &'a mut [Box<dyn Stage>],
}

impl<'a> Upstream<'a> {
    pub fn new(stages: &'a mut [Box<dyn Stage>]) -> Self {
        Upstream { stages }
    }

    /// Upstream of an initial source.
    pub fn empty() -> Upstream<'static> {
        Upstream { stages: &mut [] }
    }

    pub async fn next(&mut self) -> Result<GetNextResult, StageError> {
        match self.stages.split_last_mut() {
            None => Ok(GetNextResult::Eof),
            Some((last, rest)) => {
                let mut upstream = Upstream { stages: rest };
                last.get_next(&mut upstream).await
            }
        }
    }

    /// Disposes every upstream stage, e.g. once a limit has been satisfied.
    pub fn dispose(&mut self) {
        for stage in self.stages.iter_mut() {
            stage.dispose();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
