//! Shared error types for collaborator calls.

use thiserror::Error;

/// Errors surfaced by the query engine.
///
/// The split matters to the verifier: retryable errors are absorbed by the
/// polling budget, terminal ones abort a verification immediately.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Network-level failure reaching the engine.
    #[error("transport error: {0}")]
    Transport(String),

    /// Engine asked the caller to back off.
    #[error("throttled: {0}")]
    Throttled(String),

    /// Engine-side failure executing an otherwise valid request.
    #[error("service error: {0}")]
    Service(String),

    /// The engine rejected the request itself (bad syntax, unknown
    /// database). Retrying cannot help.
    #[error("request rejected: {0}")]
    BadRequest(String),
}

impl QueryError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, QueryError::BadRequest(_))
    }
}

/// Errors raised while submitting an ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Source payload could not be read.
    #[error("failed to read source: {0}")]
    Io(#[from] std::io::Error),

    /// The backend refused the submission.
    #[error("submission rejected: {0}")]
    Rejected(String),

    /// Network-level failure reaching the backend.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors raised by the status-queue transport.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("drain error: {0}")]
    Drain(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_is_terminal() {
        assert!(!QueryError::BadRequest("syntax".into()).is_retryable());
        assert!(QueryError::Transport("reset".into()).is_retryable());
        assert!(QueryError::Throttled("429".into()).is_retryable());
        assert!(QueryError::Service("500".into()).is_retryable());
    }

    #[test]
    fn display_messages() {
        let err = QueryError::BadRequest("unknown database 'invalid'".into());
        assert!(err.to_string().contains("unknown database"));

        let err = IngestError::Rejected("table missing".into());
        assert_eq!(err.to_string(), "submission rejected: table missing");
    }
}
