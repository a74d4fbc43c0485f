//! Download-then-ingest orchestration
//!
//! A run moves through `downloading → create-schema → append-loop → done`.
//! The first chunk decides the table schema and replaces the target table;
//! every chunk, the first included, is then coerced and appended on its own.
//! Appended chunks are not rolled back when a later chunk fails.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::config::{Compression, IngestConfig, SourceType};
use super::download::{Downloader, TempDownload};
use super::error::IngestError;
use super::progress::{IngestProgress, format_number};
use super::reader::{Chunk, ChunkReader};
use super::schema::TableSchema;
use super::sink::TableSink;

/// Timing of one appended chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkStats {
    pub index: usize,
    pub rows: u64,
    pub duration: Duration,
}

/// Statistics from an ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestStats {
    /// Identifier of the run, also used in the temporary file name
    pub run_id: String,
    /// Per-chunk results, in append order
    pub chunks: Vec<ChunkStats>,
    /// Number of rows appended
    pub rows_ingested: u64,
    /// Rows in the target table after the run
    pub table_rows: i64,
    /// Number of columns in the target table
    pub columns: usize,
    /// Bytes downloaded (0 for local sources)
    pub bytes_downloaded: u64,
    /// Downloaded file left on disk, when kept
    pub kept_download: Option<PathBuf>,
    /// Duration of the whole run
    pub duration: Duration,
}

impl IngestStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an appended chunk
    pub fn record_chunk(&mut self, index: usize, rows: u64, duration: Duration) {
        self.rows_ingested += rows;
        self.chunks.push(ChunkStats {
            index,
            rows,
            duration,
        });
    }

    /// Number of chunks appended
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Get rows per second throughput
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.rows_ingested as f64 / secs
        }
    }

    /// Format duration as human-readable string
    pub fn duration_string(&self) -> String {
        let secs = self.duration.as_secs();
        if secs < 60 {
            format!("{:.1}s", self.duration.as_secs_f64())
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

/// Downloads a CSV source and streams it into a table in chunks
pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    /// Create an ingestor for a validated configuration
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// The configuration this ingestor runs with
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run the ingestion into `sink`.
    ///
    /// The temporary download is removed on every exit path unless
    /// `keep_download` is set.
    pub async fn run(&self, sink: &mut dyn TableSink) -> Result<IngestStats, IngestError> {
        let run_id = Uuid::new_v4().simple().to_string();
        let span = info_span!(
            "ingest",
            run_id = %run_id,
            table = %self.config.table_name,
            backend = sink.backend_name()
        );

        self.run_inner(sink, run_id).instrument(span).await
    }

    async fn run_inner(
        &self,
        sink: &mut dyn TableSink,
        run_id: String,
    ) -> Result<IngestStats, IngestError> {
        let start = Instant::now();
        let mut progress = IngestProgress::new(self.config.show_progress);
        let mut stats = IngestStats {
            run_id,
            ..IngestStats::new()
        };

        info!("Starting ingestion from {}", self.config.source.display());

        let download = match &self.config.source {
            SourceType::Http(url) => {
                let downloader =
                    Downloader::new(&self.config.download_dir, self.config.keep_download)?;
                match downloader.download(url, &stats.run_id, &mut progress).await {
                    Ok(download) => Some(download),
                    Err(e) => {
                        progress.finish_error("Download failed");
                        return Err(e);
                    }
                }
            }
            SourceType::Local(_) => None,
        };

        let path = match (&download, &self.config.source) {
            (Some(download), _) => download.path().to_path_buf(),
            (None, SourceType::Local(path)) => path.clone(),
            (None, SourceType::Http(url)) => {
                return Err(IngestError::Download {
                    url: url.clone(),
                    reason: "no file was downloaded".to_string(),
                });
            }
        };
        stats.bytes_downloaded = download.as_ref().map(TempDownload::bytes).unwrap_or(0);

        let result = self
            .ingest_file(
                &path,
                self.config.source.compression(),
                sink,
                &mut progress,
                &mut stats,
            )
            .await;

        if let Some(download) = download {
            stats.kept_download = download.is_kept().then(|| path.clone());
            match download.cleanup() {
                Ok(true) => info!("Output file deleted"),
                Ok(false) => {}
                Err(e) if result.is_ok() => return Err(e),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        stats.duration = start.elapsed();
        match result {
            Ok(()) => {
                progress.finish_success(&format!(
                    "Ingested {} rows into {}",
                    format_number(stats.rows_ingested),
                    self.config.table_name
                ));
                info!(
                    rows = stats.rows_ingested,
                    chunks = stats.chunk_count(),
                    "Ingestion complete in {}",
                    stats.duration_string()
                );
                Ok(stats)
            }
            Err(e) => {
                progress.finish_error("Ingestion failed");
                Err(e)
            }
        }
    }

    async fn ingest_file(
        &self,
        path: &Path,
        compression: Compression,
        sink: &mut dyn TableSink,
        progress: &mut IngestProgress,
        stats: &mut IngestStats,
    ) -> Result<(), IngestError> {
        let table = self.config.table_name.as_str();
        let mut reader = ChunkReader::open(path, compression, self.config.chunk_size)?;
        let headers = reader.headers().clone();

        // Create schema from the first chunk
        let first = reader.next_chunk()?;
        let schema = TableSchema::infer(&headers, first.as_ref(), &self.config.datetime_columns)?;
        info!("{}", schema.create_table_sql(table, sink.dialect()));

        sink.replace_table(table, &schema).await?;
        stats.columns = schema.len();
        progress.start_rows();

        // Append loop
        for chunk in first.into_iter().map(Ok).chain(&mut reader) {
            self.append_chunk(chunk?, &schema, sink, progress, stats)
                .await?;
        }
        info!("No more chunks to read");

        stats.table_rows = sink.row_count(table).await?;
        if stats.table_rows != stats.rows_ingested as i64 {
            warn!(
                "Table {} holds {} rows but {} were appended",
                table, stats.table_rows, stats.rows_ingested
            );
        }
        Ok(())
    }

    async fn append_chunk(
        &self,
        chunk: Chunk,
        schema: &TableSchema,
        sink: &mut dyn TableSink,
        progress: &IngestProgress,
        stats: &mut IngestStats,
    ) -> Result<(), IngestError> {
        let started = Instant::now();
        debug!(
            chunk = chunk.index,
            rows = chunk.len(),
            first_line = chunk.first_line(),
            "Coercing chunk"
        );

        let rows = schema.coerce_chunk(&chunk)?;
        let written = sink
            .append_rows(&self.config.table_name, schema, &rows)
            .await?;

        let elapsed = started.elapsed();
        stats.record_chunk(chunk.index, written, elapsed);
        progress.update_rows(stats.chunk_count(), stats.rows_ingested);
        info!(
            chunk = chunk.index,
            rows = written,
            "Inserted another chunk, took {:.3} seconds",
            elapsed.as_secs_f64()
        );
        Ok(())
    }
}
