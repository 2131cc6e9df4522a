#![allow(dead_code)]

use engine_core::{
    collection::Collection,
    context::{ExpressionContext, OperationContext},
    executor::{YieldPolicy, scan::CollectionScan},
};
use engine_processing::cursor::{CursorStage, config::CursorConfig};
use model::records::document::RawRecord;
use serde_json::json;
use std::sync::Arc;

pub mod utils;

const TEST_NAMESPACE: &str = "test.letters";

fn record(value: serde_json::Value) -> RawRecord {
    value.as_object().cloned().expect("test record must be an object")
}

/// Collection holding one `{pos, name}` record per letter.
fn letters_collection(names: &[&str]) -> Arc<Collection> {
    Collection::with_records(
        TEST_NAMESPACE,
        names
            .iter()
            .enumerate()
            .map(|(pos, name)| record(json!({ "pos": pos, "name": name })))
            .collect(),
    )
}

/// Cursor stage over a fresh collection scan of `collection`.
fn scan_cursor(
    collection: &Arc<Collection>,
    exp_ctx: ExpressionContext,
    config: CursorConfig,
) -> CursorStage {
    let scan = CollectionScan::new(collection, exp_ctx.op_ctx, None, YieldPolicy::YieldAuto);
    CursorStage::create(collection, Box::new(scan), exp_ctx, config).expect("create cursor stage")
}

fn default_ctx() -> ExpressionContext {
    ExpressionContext::new(OperationContext::new())
}
