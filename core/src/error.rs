use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Capture failed: {reason}")]
    Capture { reason: String },

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("Value under key '{key}' is not valid UTF-8")]
    InvalidUtf8 { key: String },

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Cannot read {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
