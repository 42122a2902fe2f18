//! In-memory simulated cluster.
//!
//! Implements every collaborator port against process-local state so the
//! harness can be exercised without live infrastructure. Batched ingestion
//! applies after a configurable visibility delay and reports to the status
//! queues, mirroring the asynchronous pipeline; streaming ingestion applies
//! on the synchronous path.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flate2::read::GzDecoder;
use tracing::debug;
use uuid::Uuid;

use rowwatch_core::{
    BatchIngestor, Compression, DataFormat, FileSource, IngestError, IngestionMapping,
    IngestionProperties, QueryEngine, QueryError, QueryResponse, QueueError, RowTable,
    StatusQueue, StatusRecord, StreamSource, StreamingIngestor,
};

#[derive(Debug, Default)]
struct TableState {
    mappings: HashMap<String, serde_json::Value>,
    rows: u64,
}

#[derive(Default)]
struct ClusterState {
    tables: HashMap<(String, String), TableState>,
    success: Vec<StatusRecord>,
    failure: Vec<StatusRecord>,
}

/// The simulated cluster. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct InMemoryCluster {
    state: Arc<Mutex<ClusterState>>,
    visibility_delay: Duration,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::with_visibility_delay(Duration::from_millis(100))
    }

    /// How long batched rows stay invisible to count queries after a
    /// submission is accepted.
    pub fn with_visibility_delay(visibility_delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClusterState::default())),
            visibility_delay,
        }
    }

    pub fn engine(&self) -> Arc<dyn QueryEngine> {
        Arc::new(self.clone())
    }

    pub fn batch_ingestor(&self) -> Arc<dyn BatchIngestor> {
        Arc::new(self.clone())
    }

    pub fn streaming_ingestor(&self) -> Arc<dyn StreamingIngestor> {
        Arc::new(self.clone())
    }

    pub fn success_queue(&self) -> Arc<dyn StatusQueue> {
        Arc::new(MemoryStatusQueue {
            state: self.state.clone(),
            side: QueueSide::Success,
        })
    }

    pub fn failure_queue(&self) -> Arc<dyn StatusQueue> {
        Arc::new(MemoryStatusQueue {
            state: self.state.clone(),
            side: QueueSide::Failure,
        })
    }

    /// Current visible row count, if the table exists.
    pub fn row_count(&self, database: &str, table: &str) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(&(database.to_string(), table.to_string()))
            .map(|t| t.rows)
    }

    fn submit_batch(&self, body: Vec<u8>, compression: Compression, props: IngestionProperties) {
        debug!(
            database = %props.database,
            table = %props.table,
            bytes = body.len(),
            "Batch ingestion submitted"
        );

        let state = self.state.clone();
        let delay = self.visibility_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            apply_batch(&state, &body, compression, &props);
        });
    }

    fn apply_streaming(
        &self,
        body: &[u8],
        compression: Compression,
        props: &IngestionProperties,
    ) -> Result<(), IngestError> {
        let rows = count_rows(body, compression, props.format).map_err(IngestError::Rejected)?;

        let mut state = self.state.lock().unwrap();
        let key = (props.database.clone(), props.table.clone());
        let table = state.tables.get_mut(&key).ok_or_else(|| {
            IngestError::Rejected(format!(
                "unknown target {}.{}",
                props.database, props.table
            ))
        })?;

        if let Some(IngestionMapping::Reference(name)) = &props.mapping {
            if !table.mappings.contains_key(name) {
                return Err(IngestError::Rejected(format!("unknown mapping '{name}'")));
            }
        }

        table.rows += rows;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Query engine
// ---------------------------------------------------------------------------

#[async_trait]
impl QueryEngine for InMemoryCluster {
    async fn execute(&self, database: &str, query: &str) -> Result<QueryResponse, QueryError> {
        let q = query.trim();

        if let Some(rest) = q.strip_prefix(".create table ") {
            return self.create_table(database, rest);
        }
        if let Some(rest) = q.strip_prefix(".create-or-alter table ") {
            return self.create_mapping(database, rest);
        }
        if let Some(rest) = q.strip_prefix(".drop table ") {
            return self.drop_table(database, rest);
        }
        if q.starts_with('.') {
            return Err(QueryError::BadRequest(format!(
                "unknown management command: {q}"
            )));
        }
        if let Some(table) = q.strip_suffix("| count") {
            return self.count(database, table.trim());
        }

        Err(QueryError::BadRequest(format!("syntax error: {q}")))
    }
}

impl InMemoryCluster {
    fn create_table(&self, database: &str, rest: &str) -> Result<QueryResponse, QueryError> {
        let (table, ddl) = rest
            .split_once(' ')
            .ok_or_else(|| QueryError::BadRequest("missing column list".into()))?;
        let ddl = ddl.trim();
        if !ddl.starts_with('(') || !ddl.ends_with(')') {
            return Err(QueryError::BadRequest("malformed column list".into()));
        }

        let mut state = self.state.lock().unwrap();
        state
            .tables
            .entry((database.to_string(), table.to_string()))
            .or_default();
        Ok(QueryResponse::empty())
    }

    fn create_mapping(&self, database: &str, rest: &str) -> Result<QueryResponse, QueryError> {
        let (table, rest) = rest
            .split_once(' ')
            .ok_or_else(|| QueryError::BadRequest("missing mapping clause".into()))?;
        let rest = rest
            .trim()
            .strip_prefix("ingestion json mapping ")
            .ok_or_else(|| QueryError::BadRequest("unsupported mapping kind".into()))?;

        let (name, document) = quoted_pair(rest)
            .ok_or_else(|| QueryError::BadRequest("malformed mapping command".into()))?;
        let mapping: serde_json::Value = serde_json::from_str(&document)
            .map_err(|e| QueryError::BadRequest(format!("invalid mapping document: {e}")))?;

        let mut state = self.state.lock().unwrap();
        let entry = state
            .tables
            .get_mut(&(database.to_string(), table.to_string()))
            .ok_or_else(|| QueryError::BadRequest(format!("unknown table '{table}'")))?;
        entry.mappings.insert(name, mapping);
        Ok(QueryResponse::empty())
    }

    fn drop_table(&self, database: &str, rest: &str) -> Result<QueryResponse, QueryError> {
        let table = rest.trim_end_matches(" ifexists").trim();
        let mut state = self.state.lock().unwrap();
        state
            .tables
            .remove(&(database.to_string(), table.to_string()));
        Ok(QueryResponse::empty())
    }

    fn count(&self, database: &str, table: &str) -> Result<QueryResponse, QueryError> {
        let state = self.state.lock().unwrap();
        let entry = state
            .tables
            .get(&(database.to_string(), table.to_string()))
            .ok_or_else(|| QueryError::BadRequest(format!("unknown table '{table}'")))?;
        Ok(QueryResponse::single(RowTable::scalar("Count", entry.rows)))
    }
}

/// Extract two single-quoted strings: `'name' 'document'`.
fn quoted_pair(s: &str) -> Option<(String, String)> {
    let s = s.trim();
    let rest = s.strip_prefix('\'')?;
    let (name, rest) = rest.split_once('\'')?;
    let rest = rest.trim_start().strip_prefix('\'')?;
    let document = rest.strip_suffix('\'')?;
    Some((name.to_string(), document.to_string()))
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[async_trait]
impl BatchIngestor for InMemoryCluster {
    async fn ingest_from_file(
        &self,
        source: &FileSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError> {
        let body = tokio::fs::read(&source.path).await?;
        self.submit_batch(body, source.compression, props.clone());
        Ok(())
    }

    async fn ingest_from_stream(
        &self,
        source: StreamSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError> {
        self.submit_batch(source.body, source.compression, props.clone());
        Ok(())
    }
}

#[async_trait]
impl StreamingIngestor for InMemoryCluster {
    async fn ingest_from_file(
        &self,
        source: &FileSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError> {
        let body = tokio::fs::read(&source.path).await?;
        self.apply_streaming(&body, source.compression, props)
    }

    async fn ingest_from_stream(
        &self,
        source: StreamSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError> {
        self.apply_streaming(&source.body, source.compression, props)
    }
}

/// Apply a delayed batch: count payload rows, update the table, report to
/// the status queues per the submission's report level.
fn apply_batch(
    state: &Mutex<ClusterState>,
    body: &[u8],
    compression: Compression,
    props: &IngestionProperties,
) {
    let outcome = count_rows(body, compression, props.format).and_then(|rows| {
        let mut st = state.lock().unwrap();
        let key = (props.database.clone(), props.table.clone());
        match st.tables.get_mut(&key) {
            None => Err(format!(
                "database or table not found: {}.{}",
                props.database, props.table
            )),
            Some(table) => {
                if let Some(IngestionMapping::Reference(name)) = &props.mapping {
                    if !table.mappings.contains_key(name) {
                        return Err(format!("unknown mapping '{name}'"));
                    }
                }
                table.rows += rows;
                Ok(rows)
            }
        }
    });

    let record = |detail: String| StatusRecord {
        operation_id: Uuid::new_v4(),
        database: props.database.clone(),
        table: props.table.clone(),
        detail,
        raised_at: Utc::now(),
    };

    let mut st = state.lock().unwrap();
    match outcome {
        Ok(rows) => {
            debug!(
                database = %props.database,
                table = %props.table,
                rows,
                "Batch ingestion applied"
            );
            if props.report_level == rowwatch_core::ReportLevel::FailuresAndSuccesses {
                st.success.push(record(format!("ingested {rows} rows")));
            }
        }
        Err(reason) => {
            debug!(
                database = %props.database,
                table = %props.table,
                reason = %reason,
                "Batch ingestion failed"
            );
            st.failure.push(record(reason));
        }
    }
}

fn count_rows(body: &[u8], compression: Compression, format: DataFormat) -> Result<u64, String> {
    let text = decode_text(body, compression)?;
    match format {
        DataFormat::Csv => Ok(text.lines().filter(|l| !l.trim().is_empty()).count() as u64),
        DataFormat::Json => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('[') {
                let values: Vec<serde_json::Value> = serde_json::from_str(trimmed)
                    .map_err(|e| format!("invalid json array: {e}"))?;
                Ok(values.len() as u64)
            } else {
                let mut rows = 0u64;
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    serde_json::from_str::<serde_json::Value>(line)
                        .map_err(|e| format!("invalid json record: {e}"))?;
                    rows += 1;
                }
                Ok(rows)
            }
        }
    }
}

fn decode_text(body: &[u8], compression: Compression) -> Result<String, String> {
    match compression {
        Compression::None => {
            String::from_utf8(body.to_vec()).map_err(|e| format!("payload is not utf-8: {e}"))
        }
        Compression::Gzip => {
            let mut text = String::new();
            GzDecoder::new(body)
                .read_to_string(&mut text)
                .map_err(|e| format!("gzip decode failed: {e}"))?;
            Ok(text)
        }
    }
}

// ---------------------------------------------------------------------------
// Status queues
// ---------------------------------------------------------------------------

enum QueueSide {
    Success,
    Failure,
}

pub struct MemoryStatusQueue {
    state: Arc<Mutex<ClusterState>>,
    side: QueueSide,
}

#[async_trait]
impl StatusQueue for MemoryStatusQueue {
    async fn is_empty(&self) -> Result<bool, QueueError> {
        let state = self.state.lock().unwrap();
        Ok(match self.side {
            QueueSide::Success => state.success.is_empty(),
            QueueSide::Failure => state.failure.is_empty(),
        })
    }

    async fn pop_all(&self) -> Result<Vec<StatusRecord>, QueueError> {
        let mut state = self.state.lock().unwrap();
        Ok(match self.side {
            QueueSide::Success => std::mem::take(&mut state.success),
            QueueSide::Failure => std::mem::take(&mut state.failure),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
