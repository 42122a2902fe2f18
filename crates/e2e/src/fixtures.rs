//! The standard fixture set: payload files, table schema, and the
//! expectation records the suite runs through.

use std::io;
use std::path::PathBuf;

use uuid::Uuid;

use rowwatch_core::{DataFormat, IngestCase, IngestionProperties};

use crate::admin::TableSchema;

/// Name the JSON ingestion mapping is registered under.
pub const MAPPING_NAME: &str = "mappingRef";

pub fn testdata_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

pub fn testdata_path(name: &str) -> PathBuf {
    testdata_dir().join(name)
}

/// A table name unique to this run, so parallel or aborted runs never
/// collide on shared infrastructure.
pub fn unique_table_name() -> String {
    format!("IngestTest_{}", Uuid::new_v4().simple())
}

/// The column layout every fixture payload targets.
pub fn standard_schema() -> TableSchema {
    TableSchema::new()
        .column("rownumber", "int")
        .column("rowguid", "string")
        .column("xdouble", "real")
        .column("xfloat", "real")
        .column("xbool", "bool")
        .column("xint16", "int")
        .column("xint32", "int")
        .column("xint64", "long")
        .column("xuint8", "long")
        .column("xuint16", "long")
        .column("xuint32", "long")
        .column("xuint64", "long")
        .column("xdate", "datetime")
        .column("xsmalltext", "string")
        .column("xtext", "string")
        .column("xnumberAsText", "string")
        .column("xtime", "timespan")
        .column("xtextWithNulls", "string")
        .column("xdynamicWithNulls", "dynamic")
}

/// Column mapping for the JSON payloads, read from the fixture file.
pub fn load_column_mapping() -> io::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(testdata_path("dataset_mapping.json"))?;
    serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// The six expectation records of the standard run. Inline-mapping cases are
/// excluded from the streaming client, which only accepts mapping
/// references.
pub fn standard_cases(
    database: &str,
    table: &str,
    column_mapping: &serde_json::Value,
) -> Vec<IngestCase> {
    let csv = IngestionProperties::new(database, table, DataFormat::Csv);
    let json_ref = IngestionProperties::new(database, table, DataFormat::Json)
        .with_mapping_reference(MAPPING_NAME);
    let json_inline = IngestionProperties::new(database, table, DataFormat::Json)
        .with_inline_mapping(column_mapping.clone());

    vec![
        IngestCase::new("csv", testdata_path("dataset.csv"), 10, csv.clone()),
        IngestCase::new(
            "csv.gz",
            testdata_path("dataset_gzip.csv.gz"),
            10,
            csv,
        ),
        IngestCase::new(
            "json with mapping ref",
            testdata_path("dataset.json"),
            2,
            json_ref.clone(),
        ),
        IngestCase::new(
            "json.gz with mapping ref",
            testdata_path("dataset_gzip.json.gz"),
            2,
            json_ref,
        ),
        IngestCase::new(
            "json with inline mapping",
            testdata_path("dataset.json"),
            2,
            json_inline.clone(),
        )
        .batch_only(),
        IngestCase::new(
            "json.gz with inline mapping",
            testdata_path("dataset_gzip.json.gz"),
            2,
            json_inline,
        )
        .batch_only(),
    ]
}

#[cfg(test)]
mod tests {
    use rowwatch_core::{Compression, IngestionMapping};

    use super::*;

    #[test]
    fn schema_matches_fixture_layout() {
        let schema = standard_schema();
        assert_eq!(schema.len(), 19);
        assert!(schema.ddl().starts_with("(rownumber:int,"));
        assert!(schema.ddl().ends_with("xdynamicWithNulls:dynamic)"));
    }

    #[test]
    fn mapping_fixture_parses_and_covers_every_column() {
        let mapping = load_column_mapping().unwrap();
        let entries = mapping.as_array().expect("mapping should be an array");
        assert_eq!(entries.len(), 19);
        assert_eq!(entries[0]["column"], "rownumber");
    }

    #[test]
    fn standard_cases_cover_every_path() {
        let mapping = load_column_mapping().unwrap();
        let cases = standard_cases("e2e", "T", &mapping);

        assert_eq!(cases.len(), 6);
        assert_eq!(cases.iter().filter(|c| c.streaming).count(), 4);
        assert_eq!(cases.iter().map(|c| c.rows).sum::<u64>(), 28);

        // Gzip cases sniff their compression from the file name.
        assert_eq!(cases[1].file_source().compression, Compression::Gzip);
        assert_eq!(cases[0].file_source().compression, Compression::None);

        // Inline-mapping cases carry the full mapping document.
        assert!(matches!(
            cases[4].props.mapping,
            Some(IngestionMapping::Inline(_))
        ));
    }

    #[test]
    fn fixture_files_exist() {
        for name in [
            "dataset.csv",
            "dataset_gzip.csv.gz",
            "dataset.json",
            "dataset_gzip.json.gz",
            "dataset_mapping.json",
        ] {
            assert!(testdata_path(name).exists(), "missing fixture {name}");
        }
    }

    #[test]
    fn table_names_are_unique() {
        assert_ne!(unique_table_name(), unique_table_name());
    }
}
