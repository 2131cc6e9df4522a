use crate::error::CliError;
use model::records::document::Document;

/// Prints one document per line.
pub fn print_documents(docs: &[Document]) -> Result<(), CliError> {
    for doc in docs {
        let line = serde_json::to_string(doc).map_err(CliError::JsonSerialize)?;
        println!("{line}");
    }
    Ok(())
}

pub fn print_explain(stages: Vec<serde_json::Value>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(&serde_json::json!({ "stages": stages }))
        .map_err(CliError::JsonSerialize)?;
    println!("{json}");
    Ok(())
}
