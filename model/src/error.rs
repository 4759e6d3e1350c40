//! Typed error taxonomy surfaced through the HTTP API.

use thiserror::Error;

/// An error surfaced to the job manager or the HTTP layer.
///
/// Each variant maps to one stable error code, which the server
/// translates into a JSON error body and HTTP status.
#[derive(Debug, Error)]
pub enum DistillError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("embedding provider failed: {0}")]
    EmbeddingFailure(String),

    #[error("merge failed: {0}")]
    MergeFailed(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("job exceeded its deadline")]
    Timeout,

    #[error("job was cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DistillError {
    /// Stable machine-readable code for the error response body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::EmbeddingFailure(_) => "embedding_failure",
            Self::MergeFailed(_) => "merge_failed",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Timeout => 504,
            Self::EmbeddingFailure(_) | Self::MergeFailed(_) | Self::PersistenceFailure(_) => 502,
            Self::Cancelled => 499,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let err = DistillError::BadRequest("missing field".into());
        assert_eq!(err.code(), "bad_request");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn timeout_maps_to_504() {
        assert_eq!(DistillError::Timeout.status(), 504);
    }
}
