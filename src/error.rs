use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("No input files found. Pass a file or a directory containing {0} files.")]
    NoWork(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Override table error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;
