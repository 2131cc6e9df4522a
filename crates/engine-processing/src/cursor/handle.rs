use crate::error::StageError;
use engine_core::{
    collection::{CollectionLock, range::RangePreserver},
    context::OperationContext,
    executor::PlanExecutor,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Detached,
}

/// Exclusive owner of an executor, tracking whether it is attached to an
/// operation context. Disposal consumes the handle.
pub struct ExecutionHandle {
    executor: Box<dyn PlanExecutor>,
    state: HandleState,
}

impl ExecutionHandle {
    pub fn new(executor: Box<dyn PlanExecutor>) -> Self {
        ExecutionHandle {
            executor,
            state: HandleState::Active,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Mutable access for driving the executor; refused while detached.
    pub fn executor_mut(&mut self) -> Result<&mut dyn PlanExecutor, StageError> {
        match self.state {
            HandleState::Active => Ok(self.executor.as_mut()),
            HandleState::Detached => Err(StageError::invalid_state(format!(
                "executor {} is detached from its operation context",
                self.executor.id()
            ))),
        }
    }

    pub fn executor(&self) -> &dyn PlanExecutor {
        self.executor.as_ref()
    }

    /// Returns whether the handle transitioned.
    pub fn detach(&mut self) -> bool {
        if self.state == HandleState::Detached {
            return false;
        }
        self.executor.detach_from_operation_context();
        self.state = HandleState::Detached;
        true
    }

    /// Returns whether the handle transitioned.
    pub fn reattach(&mut self, op_ctx: OperationContext) -> bool {
        if self.state == HandleState::Active {
            return false;
        }
        self.executor.reattach_to_operation_context(op_ctx);
        self.state = HandleState::Active;
        true
    }

    /// Deregisters and destroys the executor while `lock` is held.
    pub fn dispose(mut self, lock: &mut CollectionLock<'_>) {
        self.executor.dispose(lock);
        debug!(executor = %self.executor.id(), "Execution handle disposed");
        drop(self.executor);
    }
}

/// The executor together with the range pin protecting what it reads. Both
/// go away together, in [`CursorResources::dispose`].
pub struct CursorResources {
    pub handle: ExecutionHandle,
    range: RangePreserver,
}

impl CursorResources {
    pub fn new(handle: ExecutionHandle, range: RangePreserver) -> Self {
        CursorResources { handle, range }
    }

    /// Under one collection lock: tear down the executor first, then unpin
    /// the range it was reading.
    pub fn dispose(self) {
        let CursorResources { handle, mut range } = self;
        let collection = range.collection().clone();
        let mut lock = collection.lock();

        handle.dispose(&mut lock);
        range.release(&mut lock);
    }
}
