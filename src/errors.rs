use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Resource not found: {url} (HTTP {status})")]
    ResourceNotFound { url: String, status: u16 },

    #[error("Transport error while fetching {url}: {source}")]
    TransportError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not decode {url}: {message}")]
    DecodeError { url: String, message: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("Missing required column '{column}' (available columns: {available:?})")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Table has no header row")]
    EmptyTable,
}

/// Failure to turn a remote resource into typed records.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Error, PartialEq)]
pub enum NodeInfoError {
    #[error("Node info is missing the '{0}' field")]
    MissingField(&'static str),

    #[error("Unknown node group '{0}'")]
    UnknownGroup(String),
}

#[derive(Debug, Error)]
pub enum GeneMappingError {
    #[error("Gene mapping request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gene mapping service answered with HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("No gene scores to rank")]
    EmptyInput,

    #[error("Could not launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Enrichment for {category} exited with status {status}: {stderr}")]
    Failed {
        category: String,
        status: String,
        stderr: String,
    },

    #[error("Enrichment for {0} produced no report")]
    MissingReport(String),

    #[error("Could not read enrichment report: {0}")]
    Report(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
