//! Bounded wait on the ingestion status queues.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use rowwatch_core::{StatusQueue, StatusRecord};

use crate::error::VerifyError;

/// One drain of both status queues, taken as soon as either side reported
/// something. Consumed immediately by the caller's assertion.
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    pub successes: Vec<StatusRecord>,
    pub failures: Vec<StatusRecord>,
}

impl StatusSnapshot {
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// Polls the success/failure queues until either is non-empty, then drains
/// both exactly once.
///
/// The wait is deadline-bounded: a backend that never reports produces
/// [`VerifyError::StatusTimeout`] instead of hanging the suite.
pub struct StatusWatcher {
    success: Arc<dyn StatusQueue>,
    failure: Arc<dyn StatusQueue>,
    poll_interval: Duration,
    wait_budget: Duration,
}

impl StatusWatcher {
    pub fn new(success: Arc<dyn StatusQueue>, failure: Arc<dyn StatusQueue>) -> Self {
        Self {
            success,
            failure,
            poll_interval: Duration::from_secs(1),
            wait_budget: Duration::from_secs(180),
        }
    }

    pub fn with_timing(mut self, poll_interval: Duration, wait_budget: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.wait_budget = wait_budget;
        self
    }

    /// Block until at least one queue is non-empty, then drain both.
    ///
    /// Both sides are drained whichever one fired first, and `pop_all` takes
    /// whole batches: records arriving between the emptiness check and the
    /// drain are still included, never lost to the next drain.
    pub async fn await_status(&self) -> Result<StatusSnapshot, VerifyError> {
        let deadline = Instant::now() + self.wait_budget;

        loop {
            if !self.failure.is_empty().await? || !self.success.is_empty().await? {
                break;
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(VerifyError::StatusTimeout(self.wait_budget));
            }

            debug!("Status queues empty, polling again");
            sleep(self.poll_interval).await;
        }

        let failures = self.failure.pop_all().await?;
        let successes = self.success.pop_all().await?;

        debug!(
            successes = successes.len(),
            failures = failures.len(),
            "Drained status queues"
        );

        Ok(StatusSnapshot {
            successes,
            failures,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    use rowwatch_core::QueueError;

    use super::*;

    #[derive(Default)]
    struct MemoryQueue(Mutex<Vec<StatusRecord>>);

    impl MemoryQueue {
        fn push(&self, record: StatusRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    #[async_trait]
    impl StatusQueue for MemoryQueue {
        async fn is_empty(&self) -> Result<bool, QueueError> {
            Ok(self.0.lock().unwrap().is_empty())
        }

        async fn pop_all(&self) -> Result<Vec<StatusRecord>, QueueError> {
            Ok(std::mem::take(&mut *self.0.lock().unwrap()))
        }
    }

    fn record(detail: &str) -> StatusRecord {
        StatusRecord {
            operation_id: Uuid::new_v4(),
            database: "e2e".into(),
            table: "T".into(),
            detail: detail.into(),
            raised_at: Utc::now(),
        }
    }

    fn watcher(
        success: Arc<MemoryQueue>,
        failure: Arc<MemoryQueue>,
        budget: Duration,
    ) -> StatusWatcher {
        StatusWatcher::new(success, failure)
            .with_timing(Duration::from_millis(5), budget)
    }

    #[tokio::test]
    async fn returns_once_a_failure_arrives() {
        let success = Arc::new(MemoryQueue::default());
        let failure = Arc::new(MemoryQueue::default());

        let late = failure.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            late.push(record("permanent: table does not exist"));
        });

        let snapshot = watcher(success, failure, Duration::from_secs(1))
            .await_status()
            .await
            .unwrap();

        assert_eq!(snapshot.failure_count(), 1);
        assert_eq!(snapshot.success_count(), 0);
    }

    #[tokio::test]
    async fn drains_both_queues_in_one_call() {
        let success = Arc::new(MemoryQueue::default());
        let failure = Arc::new(MemoryQueue::default());
        success.push(record("ingestion succeeded"));
        success.push(record("ingestion succeeded"));
        failure.push(record("mapping mismatch"));

        let w = watcher(success.clone(), failure.clone(), Duration::from_secs(1));
        let snapshot = w.await_status().await.unwrap();

        assert_eq!(snapshot.success_count(), 2);
        assert_eq!(snapshot.failure_count(), 1);

        // Everything was consumed by the single drain.
        assert!(success.is_empty().await.unwrap());
        assert!(failure.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn consecutive_drains_never_lose_or_duplicate() {
        let success = Arc::new(MemoryQueue::default());
        let failure = Arc::new(MemoryQueue::default());
        let w = watcher(success.clone(), failure.clone(), Duration::from_secs(1));

        success.push(record("first"));
        success.push(record("second"));
        let first = w.await_status().await.unwrap();
        assert_eq!(first.success_count(), 2);

        success.push(record("third"));
        let second = w.await_status().await.unwrap();
        assert_eq!(second.success_count(), 1);
        assert_eq!(second.successes[0].detail, "third");
    }

    #[tokio::test]
    async fn empty_queues_time_out() {
        let success = Arc::new(MemoryQueue::default());
        let failure = Arc::new(MemoryQueue::default());

        let err = watcher(success, failure, Duration::from_millis(30))
            .await_status()
            .await
            .unwrap_err();

        assert!(matches!(err, VerifyError::StatusTimeout(_)));
    }
}
