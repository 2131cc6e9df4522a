use crate::{
    commands::{Commands, QueryArgs},
    error::CliError,
};
use clap::Parser;
use engine_core::{
    collection::Collection,
    context::{ExpressionContext, OperationContext},
    executor::{YieldPolicy, scan::CollectionScan},
};
use engine_processing::{
    cursor::{CursorStage, config::CursorConfig, shape::QueryShape},
    limit::LimitStage,
    pipeline::{Pipeline, PipelineExt},
    stage::GetNextResult,
};
use model::{
    query::{deps::ParsedDeps, explain::ExplainVerbosity},
    records::document::{Document, RawRecord},
};
use std::{num::NonZeroU64, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

#[derive(Parser)]
#[command(name = "cursor", version = "0.1.0", about = "Run a cursor pipeline over a JSON file")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { query } => {
            let mut pipeline = build_pipeline(&query, None).await?;
            let docs = drain(&mut pipeline).await?;
            info!(documents = docs.len(), "Cursor drained");
            output::print_documents(&docs)?;
        }
        Commands::Explain { query, verbosity } => {
            let verbosity: ExplainVerbosity = verbosity.parse()?;
            let mut pipeline = build_pipeline(&query, Some(verbosity)).await?;
            if verbosity.includes_stats() {
                drain(&mut pipeline).await?;
            }
            output::print_explain(pipeline.serialize(Some(verbosity)))?;
        }
    }

    Ok(())
}

async fn load_records(path: &str) -> Result<Vec<RawRecord>, CliError> {
    let source = tokio::fs::read_to_string(path).await?;
    let value: serde_json::Value = serde_json::from_str(&source)?;
    let serde_json::Value::Array(items) = value else {
        return Err(CliError::InvalidInput(
            "expected a JSON array of documents".to_string(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            serde_json::Value::Object(record) => Ok(record),
            _ => Err(CliError::InvalidInput(format!("element {idx} is not a document"))),
        })
        .collect()
}

fn parse_filter(raw: Option<&str>) -> Result<Option<RawRecord>, CliError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str(raw)? {
        serde_json::Value::Object(filter) => Ok(Some(filter)),
        _ => Err(CliError::InvalidInput("filter must be a JSON object".to_string())),
    }
}

fn cursor_config(query: &QueryArgs) -> CursorConfig {
    let mut config = CursorConfig::from_env();
    if let Some(records) = query.batch_records {
        config = config.with_max_batch_records(records);
    }
    if let Some(bytes) = query.batch_bytes {
        config = config.with_batch_size_bytes(bytes);
    }
    config
}

fn query_shape(filter: Option<&RawRecord>, fields: &[String]) -> QueryShape {
    let mut builder = QueryShape::builder();
    if let Some(filter) = filter {
        builder = builder.query(serde_json::Value::Object(filter.clone()));
    }
    if !fields.is_empty() {
        let projection = fields
            .iter()
            .map(|f| (f.clone(), serde_json::Value::from(1)))
            .collect();
        builder = builder.projection(
            serde_json::Value::Object(projection),
            Some(ParsedDeps::new(fields)),
        );
    }
    builder.build()
}

async fn build_pipeline(
    query: &QueryArgs,
    explain: Option<ExplainVerbosity>,
) -> Result<Pipeline, CliError> {
    let records = load_records(&query.file).await?;
    let filter = parse_filter(query.filter.as_deref())?;
    let collection: Arc<Collection> = Collection::with_records(query.namespace.clone(), records);

    let mut exp_ctx = ExpressionContext::new(OperationContext::new());
    if let Some(verbosity) = explain {
        exp_ctx = exp_ctx.with_explain(verbosity);
    }

    let shape = query_shape(filter.as_ref(), &query.fields);
    let scan = CollectionScan::new(&collection, exp_ctx.op_ctx, filter, YieldPolicy::YieldAuto);
    let mut cursor =
        CursorStage::create(&collection, Box::new(scan), exp_ctx, cursor_config(query))?;
    cursor.record_query_shape(shape)?;
    if query.empty_docs {
        cursor.should_produce_empty_docs()?;
    }

    let limit = query
        .limit
        .map(|n| {
            NonZeroU64::new(n).ok_or_else(|| CliError::InvalidInput("limit must be positive".to_string()))
        })
        .transpose()?;
    let mut pipeline = Pipeline::new()
        .add_stage(cursor)
        .add_if(limit.is_some(), || {
            LimitStage::new(limit.unwrap_or(NonZeroU64::MIN))
        });
    pipeline.validate()?;
    pipeline.optimize();

    Ok(pipeline)
}

async fn drain(pipeline: &mut Pipeline) -> Result<Vec<Document>, CliError> {
    let mut docs = Vec::new();
    while let GetNextResult::Advanced(doc) = pipeline.get_next().await? {
        docs.push(doc);
    }
    Ok(docs)
}
