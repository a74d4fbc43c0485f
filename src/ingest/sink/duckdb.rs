//! DuckDB table sink
//!
//! Used for local ingestion into a database file and as an in-process
//! backend in tests.

use std::path::Path;

use async_trait::async_trait;

use crate::ingest::error::IngestError;
use crate::ingest::schema::{Dialect, Row, TableSchema, Value, quote_ident};
use super::TableSink;

/// Writes chunks into a DuckDB table
pub struct DuckDbSink {
    conn: duckdb::Connection,
    path: Option<String>,
}

impl DuckDbSink {
    /// Open or create a database file
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let conn = duckdb::Connection::open(path)?;
        Ok(Self {
            conn,
            path: Some(path.display().to_string()),
        })
    }

    /// Create an in-memory database
    pub fn memory() -> Result<Self, IngestError> {
        let conn = duckdb::Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    /// Database file path (None for in-memory)
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Underlying connection, for ad-hoc queries
    pub fn connection(&self) -> &duckdb::Connection {
        &self.conn
    }
}

#[async_trait]
impl TableSink for DuckDbSink {
    fn backend_name(&self) -> &'static str {
        "duckdb"
    }

    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    async fn replace_table(&mut self, table: &str, schema: &TableSchema) -> Result<(), IngestError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(&TableSchema::drop_table_sql(table))?;
        tx.execute_batch(&schema.create_table_sql(table, Dialect::DuckDb))?;
        tx.commit()?;
        Ok(())
    }

    async fn append_rows(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[Row],
    ) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut written = 0u64;
        {
            let mut stmt = tx.prepare(&schema.insert_sql(table, Dialect::DuckDb, 1))?;
            for row in rows {
                written += stmt.execute(duckdb::params_from_iter(row.iter().map(Value::to_duckdb)))? as u64;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    async fn row_count(&mut self, table: &str) -> Result<i64, IngestError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count = self.conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?;
        Ok(count)
    }
}
