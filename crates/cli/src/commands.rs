use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Run `$cursor [+ $limit]` over a JSON file and print the documents
    Run {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Run the query, then print its explain output instead of the documents
    Explain {
        #[command(flatten)]
        query: QueryArgs,

        #[arg(
            long,
            default_value = "executionStats",
            help = "queryPlanner, executionStats or allPlansExecution"
        )]
        verbosity: String,
    },
}

#[derive(Args)]
pub struct QueryArgs {
    #[arg(long, help = "Path to a JSON array of documents")]
    pub file: String,

    #[arg(long, default_value = "local.docs", help = "Collection name")]
    pub namespace: String,

    #[arg(long, help = "Equality filter as a JSON object, e.g. '{\"kind\":\"a\"}'")]
    pub filter: Option<String>,

    #[arg(long, value_delimiter = ',', help = "Only keep these field paths")]
    pub fields: Vec<String>,

    #[arg(long, help = "Stop after this many documents")]
    pub limit: Option<u64>,

    #[arg(long, help = "Maximum documents per batch")]
    pub batch_records: Option<usize>,

    #[arg(long, help = "Approximate batch size in bytes")]
    pub batch_bytes: Option<usize>,

    #[arg(long, help = "Emit empty documents instead of field data")]
    pub empty_docs: bool,
}
