use engine_core::error::{CollectionError, ExecutorError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageError {
    /// The operation is not allowed in the stage's current state. Not retried.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The execution engine failed while loading a batch. The stage has
    /// already released its engine resources when this is returned.
    #[error("Query execution failed on '{namespace}': {source}")]
    QueryExecution {
        namespace: String,
        #[source]
        source: ExecutorError,
    },

    /// The storage range could not be pinned; the stage is unusable.
    #[error("Failed to acquire resources on '{namespace}': {source}")]
    ResourceAcquisition {
        namespace: String,
        #[source]
        source: CollectionError,
    },
}

impl StageError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        StageError::InvalidState(message.into())
    }

    pub fn is_query_execution(&self) -> bool {
        matches!(self, StageError::QueryExecution { .. })
    }
}
