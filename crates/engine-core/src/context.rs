use model::query::explain::ExplainVerbosity;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Execution context an executor runs under. Executors are attached to
/// exactly one at a time and may move between them across getMore-style
/// resumptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationContext {
    op_id: u64,
}

impl OperationContext {
    pub fn new() -> Self {
        OperationContext {
            op_id: NEXT_OP_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn op_id(&self) -> u64 {
        self.op_id
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailableMode {
    #[default]
    Normal,
    /// EOF is not final; more records may show up later.
    Tailable,
    /// Like `Tailable`, and every record is handed downstream as soon as it
    /// is produced.
    TailableAndAwaitData,
}

/// Per-pipeline settings shared by all stages of one execution.
#[derive(Debug, Clone)]
pub struct ExpressionContext {
    pub op_ctx: OperationContext,
    pub explain: Option<ExplainVerbosity>,
    pub tailable: TailableMode,
}

impl ExpressionContext {
    pub fn new(op_ctx: OperationContext) -> Self {
        ExpressionContext {
            op_ctx,
            explain: None,
            tailable: TailableMode::Normal,
        }
    }

    pub fn with_explain(mut self, verbosity: ExplainVerbosity) -> Self {
        self.explain = Some(verbosity);
        self
    }

    pub fn with_tailable(mut self, mode: TailableMode) -> Self {
        self.tailable = mode;
        self
    }

    pub fn is_tailable(&self) -> bool {
        self.tailable != TailableMode::Normal
    }

    pub fn is_tailable_await_data(&self) -> bool {
        self.tailable == TailableMode::TailableAndAwaitData
    }
}
