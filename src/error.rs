use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid rule '{name}': {message}")]
    InvalidRule { name: String, message: String },

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid scan path: {0}")]
    InvalidPath(String),

    #[error("Scan '{0}' is already running")]
    DuplicateScan(String),

    #[error("Scan cancelled while {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
