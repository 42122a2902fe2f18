//! Collaborator interfaces.
//!
//! The real clients live outside this repository; the harness only defines
//! the seams it drives them through. The in-memory cluster in the e2e crate
//! implements every trait for offline runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IngestError, QueryError, QueueError};
use crate::model::{FileSource, IngestionProperties, StreamSource};

/// One table of rows returned by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl RowTable {
    /// Single-cell scalar result, e.g. from a count query.
    pub fn scalar(name: &str, value: u64) -> Self {
        Self {
            columns: vec![name.to_string()],
            rows: vec![vec![serde_json::Value::from(value)]],
        }
    }

    pub fn first_cell_u64(&self) -> Option<u64> {
        self.rows.first()?.first()?.as_u64()
    }
}

/// Engine response: management commands return an empty primary set,
/// queries return one or more row tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub primary: Vec<RowTable>,
}

impl QueryResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(table: RowTable) -> Self {
        Self {
            primary: vec![table],
        }
    }

    /// First cell of the first primary table, as u64.
    pub fn first_scalar_u64(&self) -> Option<u64> {
        self.primary.first()?.first_cell_u64()
    }
}

/// Query and management-command execution against one engine endpoint.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn execute(&self, database: &str, query: &str) -> Result<QueryResponse, QueryError>;
}

/// Batched ingestion: fire-and-forget submission to an asynchronous
/// pipeline. Completion is only observable through row counts or the
/// status queues.
#[async_trait]
pub trait BatchIngestor: Send + Sync {
    async fn ingest_from_file(
        &self,
        source: &FileSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError>;

    async fn ingest_from_stream(
        &self,
        source: StreamSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError>;
}

/// Streaming ingestion: synchronous-path submission through the engine.
#[async_trait]
pub trait StreamingIngestor: Send + Sync {
    async fn ingest_from_file(
        &self,
        source: &FileSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError>;

    async fn ingest_from_stream(
        &self,
        source: StreamSource,
        props: &IngestionProperties,
    ) -> Result<(), IngestError>;
}

/// Per-ingestion outcome notification, populated asynchronously by the
/// ingestion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub operation_id: Uuid,
    pub database: String,
    pub table: String,
    /// Backend-provided outcome detail (failure reason, success summary).
    pub detail: String,
    pub raised_at: DateTime<Utc>,
}

/// One pollable notification queue (success or failure side).
#[async_trait]
pub trait StatusQueue: Send + Sync {
    async fn is_empty(&self) -> Result<bool, QueueError>;

    /// Atomically take every record currently available, as one batch.
    /// Two consecutive drains must never lose or duplicate a record.
    async fn pop_all(&self) -> Result<Vec<StatusRecord>, QueueError>;
}
