use crate::executor::ExecutorId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Query plan killed: {0}")]
    QueryPlanKilled(String),

    #[error("Executor {0} is not attached to an operation context")]
    Detached(ExecutorId),

    #[error("Executor {0} was used after disposal")]
    Disposed(ExecutorId),

    #[error("Execution failed: {0}")]
    Failure(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    #[error("Collection '{0}' has been dropped")]
    Dropped(String),
}
