//! Table lifecycle management commands.
//!
//! Thin typed wrapper over [`QueryEngine`]: renders the management-command
//! strings for table creation, ingestion-mapping registration, and cleanup.

use std::sync::Arc;

use tracing::info;

use rowwatch_core::{QueryEngine, QueryError};

/// Ordered column list for a table DDL.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    columns: Vec<(String, String)>,
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, column_type: &str) -> Self {
        self.columns.push((name.to_string(), column_type.to_string()));
        self
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Render as a `(name:type, ...)` DDL fragment.
    pub fn ddl(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{name}:{ty}"))
            .collect();
        format!("({})", cols.join(", "))
    }
}

/// Management-command client for one database.
pub struct TableAdmin {
    engine: Arc<dyn QueryEngine>,
    database: String,
}

impl TableAdmin {
    pub fn new(engine: Arc<dyn QueryEngine>, database: &str) -> Self {
        Self {
            engine,
            database: database.to_string(),
        }
    }

    pub async fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), QueryError> {
        info!(table = %table, columns = schema.len(), "Creating table");
        let command = format!(".create table {} {}", table, schema.ddl());
        self.engine.execute(&self.database, &command).await?;
        Ok(())
    }

    /// Register (or replace) a named JSON ingestion mapping on the table.
    pub async fn create_json_mapping(
        &self,
        table: &str,
        name: &str,
        mapping: &serde_json::Value,
    ) -> Result<(), QueryError> {
        info!(table = %table, mapping = %name, "Creating ingestion mapping");
        let command = format!(
            ".create-or-alter table {table} ingestion json mapping '{name}' '{mapping}'"
        );
        self.engine.execute(&self.database, &command).await?;
        Ok(())
    }

    pub async fn drop_table(&self, table: &str) -> Result<(), QueryError> {
        info!(table = %table, "Dropping table");
        let command = format!(".drop table {table} ifexists");
        self.engine.execute(&self.database, &command).await?;
        Ok(())
    }
}
