//! Error types for hub-core

use thiserror::Error;

/// Main error type for hub-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("NLU provider error: {0}")]
    Nlu(String),

    #[error("Calendar provider error: {0}")]
    Calendar(String),

    /// Bad client input (missing user id, empty text, ...)
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was caused by the caller rather than a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for hub-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(Error::Validation("missing user".into()).is_client_error());
        assert!(!Error::Calendar("503".into()).is_client_error());
        assert!(!Error::Nlu("timeout".into()).is_client_error());
    }
}
