use thiserror::Error;

pub type Result<T> = std::result::Result<T, RistobotError>;

#[derive(Debug, Error)]
pub enum RistobotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Service error {code}: {message}")]
    Service { code: i64, message: String },

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Column length mismatch: {field} has {actual} values, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Dimension mismatch on {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate primary key {key} in {field}")]
    DuplicateKey { field: String, key: i64 },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid filter expression: {0}")]
    Filter(String),
}

impl RistobotError {
    pub fn service(code: i64, message: impl Into<String>) -> Self {
        RistobotError::Service {
            code,
            message: message.into(),
        }
    }
}
