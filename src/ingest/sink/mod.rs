//! Destination abstraction for ingested rows

use async_trait::async_trait;

use crate::ingest::error::IngestError;
use crate::ingest::schema::{Dialect, Row, TableSchema};

#[cfg(feature = "duckdb-backend")]
mod duckdb;
#[cfg(feature = "postgres-backend")]
mod postgres;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbSink;
#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresSink;

/// A relational database table that chunks are written into.
///
/// `replace_table` runs once per ingestion, before any rows are written.
/// Every `append_rows` call is atomic: either all rows of the chunk are
/// stored or none are.
#[async_trait]
pub trait TableSink: Send {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// SQL dialect the backend speaks
    fn dialect(&self) -> Dialect;

    /// Drop `table` if it exists and create it empty with `schema`
    async fn replace_table(&mut self, table: &str, schema: &TableSchema) -> Result<(), IngestError>;

    /// Append typed rows to `table`, returning the number of rows written
    async fn append_rows(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[Row],
    ) -> Result<u64, IngestError>;

    /// Count the rows currently stored in `table`
    async fn row_count(&mut self, table: &str) -> Result<i64, IngestError>;
}
