//! Expectation records and ingestion submission properties.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Payload format of a submitted source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Csv,
    Json,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Csv => "csv",
            DataFormat::Json => "json",
        }
    }
}

/// Compression applied to a source payload. The payload itself stays opaque;
/// this is only a hint forwarded to the ingestion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

impl Compression {
    /// Sniff compression from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Which per-ingestion outcomes the backend reports to the status queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLevel {
    #[default]
    FailuresOnly,
    FailuresAndSuccesses,
}

/// Schema translation from source record fields into target table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMapping {
    /// Name of a mapping pre-registered on the table.
    Reference(String),
    /// Mapping document submitted inline with the ingestion.
    Inline(serde_json::Value),
}

/// Per-submission ingestion settings, opaque to the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionProperties {
    pub database: String,
    pub table: String,
    pub format: DataFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<IngestionMapping>,
    pub flush_immediately: bool,
    pub report_level: ReportLevel,
}

impl IngestionProperties {
    pub fn new(database: &str, table: &str, format: DataFormat) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            format,
            mapping: None,
            flush_immediately: true,
            report_level: ReportLevel::default(),
        }
    }

    pub fn with_mapping_reference(mut self, name: &str) -> Self {
        self.mapping = Some(IngestionMapping::Reference(name.to_string()));
        self
    }

    pub fn with_inline_mapping(mut self, mapping: serde_json::Value) -> Self {
        self.mapping = Some(IngestionMapping::Inline(mapping));
        self
    }

    pub fn with_report_level(mut self, level: ReportLevel) -> Self {
        self.report_level = level;
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }
}

/// A file on disk handed to an ingestion client.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    pub compression: Compression,
}

impl FileSource {
    /// Wrap a path, sniffing compression from the extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let compression = Compression::from_path(&path);
        Self { path, compression }
    }
}

/// An in-memory payload handed to an ingestion client.
#[derive(Debug, Clone)]
pub struct StreamSource {
    pub body: Vec<u8>,
    pub compression: Compression,
}

impl StreamSource {
    pub fn new(body: Vec<u8>, compression: Compression) -> Self {
        Self { body, compression }
    }

    /// Read a file into memory, sniffing compression from the extension.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            body: std::fs::read(path)?,
            compression: Compression::from_path(path),
        })
    }
}

/// One expectation record: a source payload plus the row delta it must
/// eventually produce. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct IngestCase {
    /// Human-readable case name used in logs and failure messages.
    pub description: String,
    /// Source file under the fixture directory.
    pub path: PathBuf,
    /// Row delta this payload adds to the target table.
    pub rows: u64,
    pub props: IngestionProperties,
    /// Whether the case is also exercised through the streaming client.
    pub streaming: bool,
}

impl IngestCase {
    pub fn new(
        description: &str,
        path: impl Into<PathBuf>,
        rows: u64,
        props: IngestionProperties,
    ) -> Self {
        Self {
            description: description.to_string(),
            path: path.into(),
            rows,
            props,
            streaming: true,
        }
    }

    pub fn batch_only(mut self) -> Self {
        self.streaming = false;
        self
    }

    pub fn file_source(&self) -> FileSource {
        FileSource::new(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_sniffing() {
        assert_eq!(
            Compression::from_path(Path::new("data/dataset_gzip.csv.gz")),
            Compression::Gzip
        );
        assert_eq!(
            Compression::from_path(Path::new("data/dataset.csv")),
            Compression::None
        );
        assert_eq!(Compression::from_path(Path::new("noext")), Compression::None);
    }

    #[test]
    fn properties_builders() {
        let props = IngestionProperties::new("db", "T", DataFormat::Json)
            .with_mapping_reference("mappingRef")
            .with_report_level(ReportLevel::FailuresAndSuccesses);

        assert_eq!(props.database, "db");
        assert_eq!(props.format, DataFormat::Json);
        assert_eq!(
            props.mapping,
            Some(IngestionMapping::Reference("mappingRef".to_string()))
        );
        assert_eq!(props.report_level, ReportLevel::FailuresAndSuccesses);
        assert!(props.flush_immediately);
    }

    #[test]
    fn properties_serde_roundtrip() {
        let props = IngestionProperties::new("db", "T", DataFormat::Csv);
        let json = serde_json::to_string(&props).unwrap();
        // No mapping -> key omitted entirely.
        assert!(!json.contains("mapping"));

        let back: IngestionProperties = serde_json::from_str(&json).unwrap();
        assert_eq!(back.table, "T");
        assert_eq!(back.format, DataFormat::Csv);
        assert_eq!(back.report_level, ReportLevel::FailuresOnly);
    }

    #[test]
    fn case_streaming_flag() {
        let props = IngestionProperties::new("db", "T", DataFormat::Json);
        let case = IngestCase::new("json inline", "data/dataset.json", 2, props).batch_only();
        assert!(!case.streaming);
        assert_eq!(case.rows, 2);
    }

    #[test]
    fn file_source_carries_compression() {
        let props = IngestionProperties::new("db", "T", DataFormat::Csv);
        let case = IngestCase::new("csv.gz", "data/dataset_gzip.csv.gz", 10, props);
        assert_eq!(case.file_source().compression, Compression::Gzip);
    }
}
