//! Eventual-consistency row-count verification.
//!
//! Ingestion is asynchronous: rows become countable some time after a
//! submission is accepted. [`CountVerifier`] polls a count query under a
//! fixed retry budget until the observed delta reaches the expectation,
//! then checks for exact equality.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

use rowwatch_core::{QueryEngine, QueryError};

use crate::error::VerifyError;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Fixed retry budget for one verification: `attempts` polls spaced `delay`
/// apart, for a hard wall-clock ceiling of `attempts x delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// 18 polls, 10 seconds apart: a 3-minute ceiling.
    fn default() -> Self {
        Self {
            attempts: 18,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Total wall-clock ceiling for one verification.
    pub fn budget(&self) -> Duration {
        self.delay * self.attempts
    }
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Verifies expected row deltas against one target table.
///
/// The verifier owns the running baseline: the total of previously confirmed
/// rows. Each verification measures only its own delta against that
/// baseline, so sequential cases against the same table do not re-count each
/// other's rows. Holding the baseline behind `&mut self` keeps it off any
/// shared module state and makes concurrent misuse a compile error.
pub struct CountVerifier {
    engine: Arc<dyn QueryEngine>,
    database: String,
    table: String,
    policy: RetryPolicy,
    baseline: u64,
}

impl CountVerifier {
    pub fn new(engine: Arc<dyn QueryEngine>, database: &str, table: &str) -> Self {
        Self::with_policy(engine, database, table, RetryPolicy::default())
    }

    pub fn with_policy(
        engine: Arc<dyn QueryEngine>,
        database: &str,
        table: &str,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            database: database.to_string(),
            table: table.to_string(),
            policy,
            baseline: 0,
        }
    }

    /// Rows confirmed by all completed verifications so far.
    pub fn baseline(&self) -> u64 {
        self.baseline
    }

    /// Wait for `expected` new rows to become countable, then require the
    /// observed delta to equal the expectation exactly.
    ///
    /// Each attempt sleeps, then counts. Retryable query errors are absorbed
    /// by the budget and the last one rides along in a final
    /// [`VerifyError::Mismatch`]; terminal errors abort immediately. Polling
    /// stops early once the observed delta reaches the expectation. The call
    /// never outlives the policy budget, whatever the engine does.
    ///
    /// On exit the baseline advances by the observed delta even when the
    /// equality check fails: partially visible rows must not leak into the
    /// next case's delta.
    pub async fn expect_rows(&mut self, case: &str, expected: u64) -> Result<u64, VerifyError> {
        let deadline = Instant::now() + self.policy.budget();
        let mut observed: u64 = 0;
        let mut last_error: Option<QueryError> = None;
        let mut attempts_used: u32 = 0;

        for attempt in 1..=self.policy.attempts {
            attempts_used = attempt;

            let wake = (Instant::now() + self.policy.delay).min(deadline);
            sleep_until(wake).await;

            match timeout_at(deadline, self.total_rows()).await {
                Ok(Ok(total)) => {
                    last_error = None;
                    observed = total.saturating_sub(self.baseline);

                    debug!(
                        case = %case,
                        attempt,
                        total,
                        observed,
                        expected,
                        "Polled row count"
                    );

                    if observed >= expected {
                        break;
                    }
                }
                Ok(Err(e)) if e.is_retryable() => {
                    debug!(case = %case, attempt, error = %e, "Count query failed, will retry");
                    last_error = Some(e);
                }
                Ok(Err(e)) => {
                    // Terminal: the partial delta is still consumed so later
                    // verifications stay consistent.
                    self.baseline += observed;
                    return Err(VerifyError::Query(e));
                }
                Err(_) => {
                    last_error = Some(QueryError::Transport(format!(
                        "count query still pending at the {:?} budget",
                        self.policy.budget()
                    )));
                    break;
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        self.baseline += observed;

        if observed == expected {
            info!(
                case = %case,
                confirmed = observed,
                baseline = self.baseline,
                "Row delta confirmed"
            );
            Ok(observed)
        } else {
            warn!(
                case = %case,
                expected,
                observed,
                baseline = self.baseline,
                "Row delta did not match; partial delta consumed into baseline"
            );
            Err(VerifyError::Mismatch {
                case: case.to_string(),
                expected,
                observed,
                attempts: attempts_used,
                last_error,
            })
        }
    }

    async fn total_rows(&self) -> Result<u64, QueryError> {
        let query = format!("{} | count", self.table);
        let resp = self.engine.execute(&self.database, &query).await?;

        resp.first_scalar_u64()
            .ok_or_else(|| QueryError::Service("count query returned no scalar".into()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant as StdInstant;

    use async_trait::async_trait;

    use rowwatch_core::{QueryResponse, RowTable};

    use super::*;

    /// Engine that answers count queries from a script. The last entry
    /// repeats once the script is exhausted.
    struct ScriptedEngine {
        script: Vec<Result<u64, QueryError>>,
        calls: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Result<u64, QueryError>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryEngine for ScriptedEngine {
        async fn execute(&self, _db: &str, _query: &str) -> Result<QueryResponse, QueryError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let entry = self
                .script
                .get(i)
                .or_else(|| self.script.last())
                .expect("script must be non-empty");

            entry
                .clone()
                .map(|n| QueryResponse::single(RowTable::scalar("Count", n)))
        }
    }

    /// Engine whose queries never return.
    struct HangingEngine;

    #[async_trait]
    impl QueryEngine for HangingEngine {
        async fn execute(&self, _db: &str, _query: &str) -> Result<QueryResponse, QueryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("the verifier deadline must cut this off");
        }
    }

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(5))
    }

    #[test]
    fn budget_is_attempts_times_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.budget(), Duration::from_secs(180));
        assert_eq!(quick(3).budget(), Duration::from_millis(15));
    }

    #[tokio::test]
    async fn confirms_when_count_reaches_expected() {
        let engine = ScriptedEngine::new(vec![Ok(10)]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(3));

        let confirmed = verifier.expect_rows("csv", 10).await.unwrap();
        assert_eq!(confirmed, 10);
        assert_eq!(verifier.baseline(), 10);
    }

    #[tokio::test]
    async fn stops_polling_once_delta_reached() {
        let engine = ScriptedEngine::new(vec![Ok(4), Ok(10)]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(10));

        verifier.expect_rows("csv", 10).await.unwrap();
        // Attempt 2 already satisfied the expectation; no further polls.
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn sequential_verifications_measure_only_their_own_delta() {
        let engine = ScriptedEngine::new(vec![Ok(10), Ok(12)]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(3));

        assert_eq!(verifier.expect_rows("first", 10).await.unwrap(), 10);
        // Total is now 12; only the delta of 2 belongs to the second case.
        assert_eq!(verifier.expect_rows("second", 2).await.unwrap(), 2);
        assert_eq!(verifier.baseline(), 12);
    }

    #[tokio::test]
    async fn overshoot_stops_early_but_still_mismatches() {
        let engine = ScriptedEngine::new(vec![Ok(8)]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(5));

        let err = verifier.expect_rows("csv", 5).await.unwrap_err();
        match err {
            VerifyError::Mismatch {
                expected, observed, ..
            } => {
                assert_eq!(expected, 5);
                assert_eq!(observed, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Overshoot stopped polling after one attempt.
        assert_eq!(engine.calls(), 1);
        assert_eq!(verifier.baseline(), 8);
    }

    #[tokio::test]
    async fn retryable_errors_exhaust_budget_and_surface_in_mismatch() {
        let engine =
            ScriptedEngine::new(vec![Err(QueryError::Transport("connection refused".into()))]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(3));

        let err = verifier.expect_rows("csv", 10).await.unwrap_err();
        match err {
            VerifyError::Mismatch {
                observed,
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(observed, 0);
                assert_eq!(attempts, 3);
                assert!(matches!(last_error, Some(QueryError::Transport(_))));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(engine.calls(), 3);
    }

    #[tokio::test]
    async fn terminal_error_aborts_immediately() {
        let engine =
            ScriptedEngine::new(vec![Err(QueryError::BadRequest("unknown database".into()))]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(5));

        let err = verifier.expect_rows("csv", 10).await.unwrap_err();
        assert!(matches!(err, VerifyError::Query(QueryError::BadRequest(_))));
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn failed_verification_still_consumes_partial_delta() {
        let engine = ScriptedEngine::new(vec![Ok(4), Ok(4), Ok(6)]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(2));

        let err = verifier.expect_rows("first", 10).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Mismatch { observed: 4, .. }
        ));
        assert_eq!(verifier.baseline(), 4);

        // The next case measures from the advanced baseline, not from zero:
        // the total moves 4 -> 6, a delta of exactly 2.
        assert_eq!(verifier.expect_rows("second", 2).await.unwrap(), 2);
        assert_eq!(verifier.baseline(), 6);
    }

    #[tokio::test]
    async fn hanging_engine_is_cut_at_the_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let mut verifier =
            CountVerifier::with_policy(Arc::new(HangingEngine), "db", "T", policy);

        let started = StdInstant::now();
        let err = verifier.expect_rows("csv", 10).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "verification must respect the budget, took {elapsed:?}"
        );
        match err {
            VerifyError::Mismatch { last_error, .. } => {
                assert!(matches!(last_error, Some(QueryError::Transport(_))));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_expectation_confirms_on_first_poll() {
        let engine = ScriptedEngine::new(vec![Ok(0)]);
        let mut verifier = CountVerifier::with_policy(engine.clone(), "db", "T", quick(3));

        assert_eq!(verifier.expect_rows("empty", 0).await.unwrap(), 0);
        assert_eq!(engine.calls(), 1);
    }
}
