use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Serializable tag for [`Error`], surfaced in failed task responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Ingestion,
    Index,
    Retrieval,
    Classification,
    Generation,
    Configuration,
    NotFound,
    InvalidRequest,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Index operation failed: {0}")]
    Index(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Task classification failed: {0}")]
    Classification(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Ingestion(_) => ErrorKind::Ingestion,
            Error::Index(_) => ErrorKind::Index,
            Error::Retrieval(_) => ErrorKind::Retrieval,
            Error::Classification(_) => ErrorKind::Classification,
            Error::Generation(_) => ErrorKind::Generation,
            Error::InvalidConfig(_) => ErrorKind::Configuration,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single call to an external service.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServiceError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Client errors other than timeouts and throttling will not succeed on
    /// a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Status { status, .. } => !(400..500).contains(status) || *status == 408 || *status == 429,
            _ => true,
        }
    }
}
