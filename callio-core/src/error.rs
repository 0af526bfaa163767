use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallioError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Input column(s) {} not found in input file", join_columns(.columns))]
    ColumnNotFound { columns: Vec<usize> },
    #[error("Invalid row range: {0}")]
    InvalidRange(String),
    #[error("Cannot read input file '{}': {source}", .path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot write output file '{}': {source}", .path.display())]
    FileUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(String),
    #[error("Rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("Max retries ({max}) exceeded")]
    MaxRetriesExceeded { max: usize },
    #[error("Worker task failed: {0}")]
    Worker(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn join_columns(columns: &[usize]) -> String {
    columns
        .iter()
        .map(|column| column.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
