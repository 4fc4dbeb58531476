//! Error types for hub-nlu

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NluError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("NLU API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, NluError>;

impl From<NluError> for hub_core::Error {
    fn from(err: NluError) -> Self {
        hub_core::Error::Nlu(err.to_string())
    }
}
