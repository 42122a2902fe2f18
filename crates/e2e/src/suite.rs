//! The end-to-end scenario: create a table, push every expectation record
//! through the batch and streaming clients, verify the row deltas, check the
//! status queues and the engine's rejection behavior, then clean up.
//!
//! Phases run strictly sequentially; verification for a case starts only
//! after its submission, and a single [`CountVerifier`] carries the baseline
//! across the whole run.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use rowwatch_core::{
    BatchIngestor, IngestCase, IngestError, QueryEngine, QueryError, ReportLevel, StatusQueue,
    StreamSource, StreamingIngestor,
};
use rowwatch_verify::{CountVerifier, RetryPolicy, StatusWatcher, VerifyError};

use crate::admin::{TableAdmin, TableSchema};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("setup failed: {0}")]
    Setup(#[source] QueryError),

    #[error("failed to submit {case}: {source}")]
    Ingest {
        case: String,
        #[source]
        source: IngestError,
    },

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(
        "status check expected {expected_successes} successes / {expected_failures} failures, \
         got {successes}/{failures}"
    )]
    StatusMismatch {
        expected_successes: usize,
        expected_failures: usize,
        successes: usize,
        failures: usize,
    },

    #[error("engine accepted a malformed query instead of rejecting it")]
    MissingRejection,

    #[error("teardown failed: {0}")]
    Teardown(#[source] QueryError),
}

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

/// Everything the suite needs besides the collaborator ports.
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub database: String,
    pub table: String,
    pub schema: TableSchema,
    pub mapping_name: String,
    pub column_mapping: serde_json::Value,
    pub retry: RetryPolicy,
    pub status_poll: Duration,
    pub status_budget: Duration,
}

impl SuiteOptions {
    pub fn new(
        database: &str,
        table: &str,
        schema: TableSchema,
        mapping_name: &str,
        column_mapping: serde_json::Value,
    ) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            schema,
            mapping_name: mapping_name.to_string(),
            column_mapping,
            retry: RetryPolicy::default(),
            status_poll: Duration::from_secs(1),
            status_budget: Duration::from_secs(180),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_status_timing(mut self, poll: Duration, budget: Duration) -> Self {
        self.status_poll = poll;
        self.status_budget = budget;
        self
    }
}

/// Which client path a confirmation came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    BatchFile,
    BatchStream,
    StreamingFile,
    StreamingStream,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::BatchFile => "batch/file",
            Phase::BatchStream => "batch/stream",
            Phase::StreamingFile => "streaming/file",
            Phase::StreamingStream => "streaming/stream",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub phase: Phase,
    pub case: String,
    pub confirmed: u64,
}

/// Outcome of a full run, for the caller's assertions and the summary log.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub table: String,
    pub confirmed: Vec<CaseResult>,
    /// Snapshot counts from the success-path status check.
    pub status_successes: usize,
    pub status_failures: usize,
    /// Snapshot counts from the invalid-database status check.
    pub failed_ingest_successes: usize,
    pub failed_ingest_failures: usize,
    pub bad_query_rejected: bool,
    pub dropped: bool,
}

impl SuiteReport {
    pub fn total_confirmed_rows(&self) -> u64 {
        self.confirmed.iter().map(|c| c.confirmed).sum()
    }
}

// ---------------------------------------------------------------------------
// Suite
// ---------------------------------------------------------------------------

pub struct IngestSuite {
    engine: Arc<dyn QueryEngine>,
    batch: Arc<dyn BatchIngestor>,
    streaming: Arc<dyn StreamingIngestor>,
    admin: TableAdmin,
    verifier: CountVerifier,
    watcher: StatusWatcher,
    options: SuiteOptions,
}

impl IngestSuite {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        batch: Arc<dyn BatchIngestor>,
        streaming: Arc<dyn StreamingIngestor>,
        success: Arc<dyn StatusQueue>,
        failure: Arc<dyn StatusQueue>,
        options: SuiteOptions,
    ) -> Self {
        let admin = TableAdmin::new(engine.clone(), &options.database);
        let verifier = CountVerifier::with_policy(
            engine.clone(),
            &options.database,
            &options.table,
            options.retry,
        );
        let watcher = StatusWatcher::new(success, failure)
            .with_timing(options.status_poll, options.status_budget);

        Self {
            engine,
            batch,
            streaming,
            admin,
            verifier,
            watcher,
            options,
        }
    }

    /// Run every phase against the given expectation records.
    pub async fn run(&mut self, cases: &[IngestCase]) -> Result<SuiteReport, SuiteError> {
        let mut report = SuiteReport {
            table: self.options.table.clone(),
            ..SuiteReport::default()
        };

        info!(
            table = %self.options.table,
            cases = cases.len(),
            "Starting ingestion suite"
        );

        // 1. Setup
        self.setup().await?;

        // 2. Batch client, file and stream paths
        self.batch_from_files(cases, &mut report).await?;
        self.batch_from_streams(cases, &mut report).await?;

        // 3. Streaming client, eligible cases only
        self.streaming_from_files(cases, &mut report).await?;
        self.streaming_from_streams(cases, &mut report).await?;

        // 4. Status queues, success and failure paths
        self.status_success_check(cases, &mut report).await?;
        self.status_failure_check(cases, &mut report).await?;

        // 5. The engine must reject malformed queries
        self.bad_query_check(&mut report).await?;

        // 6. Teardown
        self.teardown(&mut report).await?;

        info!(
            table = %report.table,
            confirmed_rows = report.total_confirmed_rows(),
            "Ingestion suite finished"
        );
        Ok(report)
    }

    async fn setup(&self) -> Result<(), SuiteError> {
        self.admin
            .create_table(&self.options.table, &self.options.schema)
            .await
            .map_err(SuiteError::Setup)?;
        self.admin
            .create_json_mapping(
                &self.options.table,
                &self.options.mapping_name,
                &self.options.column_mapping,
            )
            .await
            .map_err(SuiteError::Setup)?;
        Ok(())
    }

    async fn batch_from_files(
        &mut self,
        cases: &[IngestCase],
        report: &mut SuiteReport,
    ) -> Result<(), SuiteError> {
        for case in cases {
            self.batch
                .ingest_from_file(&case.file_source(), &case.props)
                .await
                .map_err(|source| SuiteError::Ingest {
                    case: case.description.clone(),
                    source,
                })?;
            self.confirm(Phase::BatchFile, case, report).await?;
        }
        Ok(())
    }

    async fn batch_from_streams(
        &mut self,
        cases: &[IngestCase],
        report: &mut SuiteReport,
    ) -> Result<(), SuiteError> {
        for case in cases {
            let source = self.stream_source(case)?;
            self.batch
                .ingest_from_stream(source, &case.props)
                .await
                .map_err(|source| SuiteError::Ingest {
                    case: case.description.clone(),
                    source,
                })?;
            self.confirm(Phase::BatchStream, case, report).await?;
        }
        Ok(())
    }

    async fn streaming_from_files(
        &mut self,
        cases: &[IngestCase],
        report: &mut SuiteReport,
    ) -> Result<(), SuiteError> {
        for case in cases.iter().filter(|c| c.streaming) {
            self.streaming
                .ingest_from_file(&case.file_source(), &case.props)
                .await
                .map_err(|source| SuiteError::Ingest {
                    case: case.description.clone(),
                    source,
                })?;
            self.confirm(Phase::StreamingFile, case, report).await?;
        }
        Ok(())
    }

    async fn streaming_from_streams(
        &mut self,
        cases: &[IngestCase],
        report: &mut SuiteReport,
    ) -> Result<(), SuiteError> {
        for case in cases.iter().filter(|c| c.streaming) {
            let source = self.stream_source(case)?;
            self.streaming
                .ingest_from_stream(source, &case.props)
                .await
                .map_err(|source| SuiteError::Ingest {
                    case: case.description.clone(),
                    source,
                })?;
            self.confirm(Phase::StreamingStream, case, report).await?;
        }
        Ok(())
    }

    /// Re-ingest the first case with full reporting and expect exactly one
    /// success record and no failures.
    async fn status_success_check(
        &mut self,
        cases: &[IngestCase],
        report: &mut SuiteReport,
    ) -> Result<(), SuiteError> {
        let case = match cases.first() {
            Some(c) => c,
            None => return Ok(()),
        };
        let props = case
            .props
            .clone()
            .with_report_level(ReportLevel::FailuresAndSuccesses);

        info!(case = %case.description, "Checking success reporting");
        self.batch
            .ingest_from_file(&case.file_source(), &props)
            .await
            .map_err(|source| SuiteError::Ingest {
                case: case.description.clone(),
                source,
            })?;

        let snapshot = self.watcher.await_status().await?;
        report.status_successes = snapshot.success_count();
        report.status_failures = snapshot.failure_count();

        if snapshot.success_count() != 1 || snapshot.failure_count() != 0 {
            return Err(SuiteError::StatusMismatch {
                expected_successes: 1,
                expected_failures: 0,
                successes: snapshot.success_count(),
                failures: snapshot.failure_count(),
            });
        }

        // The extra rows are real; fold them into the baseline so any later
        // verification still measures only its own delta.
        self.verifier.expect_rows(&case.description, case.rows).await?;
        Ok(())
    }

    /// Ingest into a database that does not exist and expect exactly one
    /// failure record.
    async fn status_failure_check(
        &mut self,
        cases: &[IngestCase],
        report: &mut SuiteReport,
    ) -> Result<(), SuiteError> {
        let case = match cases.first() {
            Some(c) => c,
            None => return Ok(()),
        };
        let props = case
            .props
            .clone()
            .with_database("invalid")
            .with_report_level(ReportLevel::FailuresAndSuccesses);

        info!(case = %case.description, "Checking failure reporting");
        self.batch
            .ingest_from_file(&case.file_source(), &props)
            .await
            .map_err(|source| SuiteError::Ingest {
                case: case.description.clone(),
                source,
            })?;

        let snapshot = self.watcher.await_status().await?;
        report.failed_ingest_successes = snapshot.success_count();
        report.failed_ingest_failures = snapshot.failure_count();

        if snapshot.success_count() != 0 || snapshot.failure_count() != 1 {
            return Err(SuiteError::StatusMismatch {
                expected_successes: 0,
                expected_failures: 1,
                successes: snapshot.success_count(),
                failures: snapshot.failure_count(),
            });
        }
        Ok(())
    }

    /// Inverted expectation: the engine accepting a malformed query is the
    /// failure condition.
    async fn bad_query_check(&mut self, report: &mut SuiteReport) -> Result<(), SuiteError> {
        match self
            .engine
            .execute(&self.options.database, "invalidSyntax ")
            .await
        {
            Err(e) => {
                info!(error = %e, "Malformed query rejected as expected");
                report.bad_query_rejected = true;
                Ok(())
            }
            Ok(_) => Err(SuiteError::MissingRejection),
        }
    }

    async fn teardown(&self, report: &mut SuiteReport) -> Result<(), SuiteError> {
        self.admin
            .drop_table(&self.options.table)
            .await
            .map_err(SuiteError::Teardown)?;
        report.dropped = true;
        Ok(())
    }

    async fn confirm(
        &mut self,
        phase: Phase,
        case: &IngestCase,
        report: &mut SuiteReport,
    ) -> Result<(), SuiteError> {
        let confirmed = self
            .verifier
            .expect_rows(&case.description, case.rows)
            .await?;
        info!(phase = %phase, case = %case.description, confirmed, "Case confirmed");
        report.confirmed.push(CaseResult {
            phase,
            case: case.description.clone(),
            confirmed,
        });
        Ok(())
    }

    fn stream_source(&self, case: &IngestCase) -> Result<StreamSource, SuiteError> {
        StreamSource::from_file(&case.path).map_err(|e| SuiteError::Ingest {
            case: case.description.clone(),
            source: IngestError::Io(e),
        })
    }
}
