//! suite-runner — drives the full ingestion verification suite.
//!
//! Loads the suite configuration from the environment; a missing variable
//! skips the run cleanly instead of failing it. The run itself targets the
//! bundled in-memory cluster, giving a self-contained smoke pass of every
//! phase; downstream consumers wire their own clients through the same
//! ports.

use std::time::Duration;

use clap::Parser;
use tracing::info;

use rowwatch_core::{load_dotenv, ConfigCheck, SuiteConfig};
use rowwatch_e2e::{fixtures, IngestSuite, InMemoryCluster, SuiteOptions};
use rowwatch_verify::RetryPolicy;

// ── CLI ─────────────────────────────────────────────────────────────

/// Ingestion verification suite runner.
#[derive(Parser, Debug)]
#[command(name = "suite-runner", version, about)]
struct Cli {
    /// How long batched rows stay invisible after submission, in ms.
    #[arg(long, env = "SUITE_VISIBILITY_DELAY_MS", default_value_t = 200)]
    visibility_delay_ms: u64,

    /// Count-poll attempts per verification.
    #[arg(long, env = "SUITE_RETRY_ATTEMPTS", default_value_t = 18)]
    attempts: u32,

    /// Delay between count polls, in ms.
    #[arg(long, env = "SUITE_RETRY_DELAY_MS", default_value_t = 500)]
    retry_delay_ms: u64,

    /// Status-queue poll interval, in ms.
    #[arg(long, env = "SUITE_STATUS_POLL_MS", default_value_t = 250)]
    status_poll_ms: u64,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = match SuiteConfig::from_env() {
        ConfigCheck::Ready(config) => config,
        ConfigCheck::Skipped { missing } => {
            info!(missing = ?missing, "Skipping suite: missing configuration");
            return Ok(());
        }
    };
    config.log_summary();

    let retry = RetryPolicy::new(cli.attempts, Duration::from_millis(cli.retry_delay_ms));
    let status_poll = Duration::from_millis(cli.status_poll_ms);

    let cluster =
        InMemoryCluster::with_visibility_delay(Duration::from_millis(cli.visibility_delay_ms));

    let table = fixtures::unique_table_name();
    let column_mapping = fixtures::load_column_mapping()?;
    let cases = fixtures::standard_cases(&config.database, &table, &column_mapping);

    let options = SuiteOptions::new(
        &config.database,
        &table,
        fixtures::standard_schema(),
        fixtures::MAPPING_NAME,
        column_mapping,
    )
    .with_retry(retry)
    .with_status_timing(status_poll, retry.budget());

    let mut suite = IngestSuite::new(
        cluster.engine(),
        cluster.batch_ingestor(),
        cluster.streaming_ingestor(),
        cluster.success_queue(),
        cluster.failure_queue(),
        options,
    );

    let report = suite.run(&cases).await?;

    info!(
        table = %report.table,
        confirmations = report.confirmed.len(),
        confirmed_rows = report.total_confirmed_rows(),
        status = %format!(
            "{}/{} ok, {}/{} failed-ingest",
            report.status_successes,
            report.status_failures,
            report.failed_ingest_successes,
            report.failed_ingest_failures
        ),
        "Suite passed"
    );
    Ok(())
}
