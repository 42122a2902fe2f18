//! Verification error types.

use std::time::Duration;

use thiserror::Error;

use rowwatch_core::{QueryError, QueueError};

#[derive(Debug, Error)]
pub enum VerifyError {
    /// The confirmed delta did not match the expectation within the retry
    /// budget. Carries the last classified query error, if any, so an
    /// unreachable engine is not masked by the downstream mismatch.
    #[error(
        "row count mismatch for {case}: expected {expected}, observed {observed} \
         after {attempts} attempts"
    )]
    Mismatch {
        case: String,
        expected: u64,
        observed: u64,
        attempts: u32,
        #[source]
        last_error: Option<QueryError>,
    },

    /// A count query failed terminally; retrying cannot help.
    #[error("count query failed: {0}")]
    Query(#[from] QueryError),

    /// Neither status queue produced a record within the wait budget.
    #[error("no status records within {0:?}")]
    StatusTimeout(Duration),

    #[error("status queue error: {0}")]
    Queue(#[from] QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_names_the_case() {
        let err = VerifyError::Mismatch {
            case: "csv.gz".into(),
            expected: 10,
            observed: 4,
            attempts: 18,
            last_error: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("csv.gz"));
        assert!(msg.contains("expected 10"));
        assert!(msg.contains("observed 4"));
    }

    #[test]
    fn mismatch_surfaces_last_query_error_as_source() {
        use std::error::Error as _;

        let err = VerifyError::Mismatch {
            case: "csv".into(),
            expected: 10,
            observed: 0,
            attempts: 3,
            last_error: Some(QueryError::Transport("connection refused".into())),
        };
        let source = err.source().expect("source should be present");
        assert!(source.to_string().contains("connection refused"));
    }

    #[test]
    fn mismatch_without_query_error_has_no_source() {
        use std::error::Error as _;

        let err = VerifyError::Mismatch {
            case: "csv".into(),
            expected: 10,
            observed: 4,
            attempts: 18,
            last_error: None,
        };
        assert!(err.source().is_none());
    }
}
