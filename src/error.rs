use thiserror::Error;

/// Result type for kiln operations
pub type Result<T> = std::result::Result<T, KilnError>;

/// Errors that abort an operation.
///
/// Per-line import failures are not errors in this sense: they are recorded
/// as [`ErrorEntry`](crate::types::ErrorEntry) values and the run continues.
#[derive(Error, Debug)]
pub enum KilnError {
    /// Rule table could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A batch commit failed and was rolled back
    #[error("batch rolled back: {0}")]
    Persistence(String),

    /// Input body could not be turned into import lines
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transform rule: {0}")]
    InvalidRule(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Unexpected failure while deriving fields from an otherwise valid record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("record has no resourceType")]
    MissingResourceType,

    #[error("subject.reference must be a string, found {0}")]
    InvalidSubjectReference(String),
}
