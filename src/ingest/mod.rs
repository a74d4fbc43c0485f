//! Chunked CSV ingestion into a relational table
//!
//! This module downloads a CSV (optionally gzip-compressed) source and writes
//! it into a database table in fixed-size chunks:
//! - Download over HTTP(S) to a temporary file, removed afterwards
//! - Lazy chunked reading with on-the-fly gzip decoding
//! - Schema inference from the first chunk
//! - Timestamp coercion of named date/time columns
//! - Per-chunk appends into PostgreSQL or DuckDB
//!
//! # Example
//!
//! ```rust,ignore
//! use ingest_data::ingest::{ConnectionParams, IngestConfig, Ingestor, PostgresSink};
//!
//! let params = ConnectionParams::from_env().build()?;
//! let config = IngestConfig::builder()
//!     .source("https://example.com/yellow_tripdata_2021-01.csv.gz")?
//!     .table_name("yellow_taxi_data")
//!     .build()?;
//!
//! let mut sink = PostgresSink::connect(&params).await?;
//! let stats = Ingestor::new(config).run(&mut sink).await?;
//!
//! println!("Ingested {} rows in {}", stats.rows_ingested, stats.duration_string());
//! ```
//!
//! # Failure semantics
//!
//! Incomplete connection parameters are rejected by
//! [`ConnectionParamsBuilder::build`] before anything touches the network.
//! Download, parse, coercion and insert errors end the run with an
//! [`IngestError`]; chunks appended before the failure stay in the table.

mod config;
mod download;
mod error;
mod ingestor;
mod progress;
mod reader;
mod schema;
mod sink;

pub use config::{
    Compression, ConnectionParams, ConnectionParamsBuilder, DEFAULT_CHUNK_SIZE,
    DEFAULT_DATETIME_COLUMNS, ENV_DB, ENV_HOST, ENV_PASSWORD, ENV_PORT, ENV_USER, FileConfig,
    IngestConfig, IngestConfigBuilder, PostgresFileConfig, SourceType,
};
pub use download::{Downloader, TempDownload};
pub use error::{ConfigError, IngestError};
pub use ingestor::{ChunkStats, IngestStats, Ingestor};
pub use progress::{IngestProgress, Spinner, format_bytes, format_number};
pub use reader::{Chunk, ChunkReader};
pub use schema::{
    ColumnDef, ColumnType, Dialect, Row, TableSchema, Value, parse_timestamp, quote_ident,
};
#[cfg(feature = "duckdb-backend")]
pub use sink::DuckDbSink;
#[cfg(feature = "postgres-backend")]
pub use sink::PostgresSink;
pub use sink::TableSink;

/// Run one ingestion with the given configuration
///
/// This is a convenience function for simple ingestion runs.
pub async fn ingest_data(
    config: IngestConfig,
    sink: &mut dyn TableSink,
) -> Result<IngestStats, IngestError> {
    Ingestor::new(config).run(sink).await
}

#[cfg(all(test, feature = "duckdb-backend"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ingest_data_local_file() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("zones.csv");
        std::fs::write(
            &source,
            "LocationID,Borough,Zone\n1,EWR,Newark Airport\n2,Queens,Jamaica Bay\n",
        )
        .unwrap();

        let config = IngestConfig::builder()
            .source(&source.display().to_string())
            .unwrap()
            .table_name("zones")
            .datetime_columns(Vec::<String>::new())
            .build()
            .unwrap();

        let mut sink = DuckDbSink::memory().unwrap();
        let stats = ingest_data(config, &mut sink).await.unwrap();
        assert_eq!(stats.rows_ingested, 2);
        assert_eq!(sink.row_count("zones").await.unwrap(), 2);
    }
}
