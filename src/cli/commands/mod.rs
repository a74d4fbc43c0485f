//! Command handlers for the ingest-data binary

pub mod ingest;
