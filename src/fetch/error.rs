//! Fetch-specific error types.

use thiserror::Error;

use crate::catalog::EntityType;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that can occur while retrieving entities from the backend.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The requested entity does not exist.
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: String },

    /// The backend has no endpoint for this entity type.
    #[error("unsupported entity type: {0}")]
    UnknownEntityType(EntityType),

    /// Transport failure (connect, timeout, TLS).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Token acquisition failed or credentials were rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The fetcher was built from unusable settings.
    #[error("invalid backend configuration: {0}")]
    Config(String),

    /// The response body was not the expected JSON shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The operation observed a cancellation signal.
    #[error("operation cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn not_found(entity_type: &EntityType, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.clone(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if retrying the same request might succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
