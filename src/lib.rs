//! Ingest Data - Chunked CSV ingestion into relational databases
//!
//! Provides:
//! - Download of CSV / gzip-compressed CSV sources over HTTP(S)
//! - Lazy chunked reading with schema inference from the first chunk
//! - Timestamp coercion of named date/time columns
//! - Table replacement and per-chunk appends (PostgreSQL, DuckDB)

pub mod ingest;

// Re-export commonly used types
pub use ingest::{
    ConfigError, ConnectionParams, IngestConfig, IngestError, IngestStats, Ingestor, TableSchema,
    TableSink,
};
#[cfg(feature = "duckdb-backend")]
pub use ingest::DuckDbSink;
#[cfg(feature = "postgres-backend")]
pub use ingest::PostgresSink;
