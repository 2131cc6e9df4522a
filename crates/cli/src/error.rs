use engine_processing::error::StageError;
use model::query::explain::ParseVerbosityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read the input file: {0}")]
    InputRead(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    InputParse(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Verbosity(#[from] ParseVerbosityError),

    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] StageError),

    #[error("Failed to serialize output: {0}")]
    JsonSerialize(serde_json::Error),
}
