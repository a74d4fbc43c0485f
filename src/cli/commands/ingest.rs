//! The ingest command: download a CSV and load it into a table

use std::path::PathBuf;

use ingest_data::ingest::{
    ConnectionParams, ConnectionParamsBuilder, DuckDbSink, FileConfig, IngestConfig, IngestStats, Ingestor,
    PostgresSink, Spinner, TableSink, format_bytes, format_number,
};

use crate::error::CliError;

/// Arguments for the ingest command; `None` falls back to the config file
#[derive(Debug, Default)]
pub struct IngestArgs {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub db: Option<String>,
    /// Target table name
    pub table_name: Option<String>,
    /// Source URL (or local path)
    pub url: Option<String>,
    /// Rows per chunk
    pub chunk_size: Option<usize>,
    /// Columns coerced to timestamps
    pub datetime_columns: Option<Vec<String>>,
    /// Directory for the temporary download
    pub download_dir: Option<PathBuf>,
    /// Keep the downloaded file
    pub keep_download: bool,
    /// Write into this DuckDB file instead of PostgreSQL
    pub duckdb: Option<PathBuf>,
    /// TOML config file
    pub config: Option<PathBuf>,
    /// Draw progress bars
    pub show_progress: bool,
}

/// Load the config file named by `--config`, or an empty one
pub fn load_file_config(args: &IngestArgs) -> Result<FileConfig, CliError> {
    match args.config {
        Some(ref path) => Ok(FileConfig::from_file(path)?),
        None => Ok(FileConfig::default()),
    }
}

/// Merge flags over `base` (the environment, in production), then fill the
/// rest from the config file, into validated connection parameters
pub fn build_connection_params(
    args: &IngestArgs,
    base: ConnectionParamsBuilder,
    file: &FileConfig,
) -> Result<ConnectionParams, CliError> {
    let mut builder = base;
    if let Some(ref user) = args.user {
        builder = builder.user(user);
    }
    if let Some(ref password) = args.password {
        builder = builder.password(password);
    }
    if let Some(ref host) = args.host {
        builder = builder.host(host);
    }
    if let Some(ref port) = args.port {
        builder = builder.port(port);
    }
    if let Some(ref db) = args.db {
        builder = builder.database(db);
    }
    let builder = builder.or_lookup(|key| file.postgres.lookup(key));
    Ok(builder.build()?)
}

/// Merge flags over the config file into a validated ingest configuration
pub fn build_ingest_config(args: &IngestArgs, file: &FileConfig) -> Result<IngestConfig, CliError> {
    let mut builder = file.ingest_builder()?;
    if let Some(ref url) = args.url {
        builder = builder.source(url)?;
    }
    if let Some(ref table_name) = args.table_name {
        builder = builder.table_name(table_name);
    }
    if let Some(chunk_size) = args.chunk_size {
        builder = builder.chunk_size(chunk_size);
    }
    if let Some(ref columns) = args.datetime_columns {
        builder = builder.datetime_columns(columns.iter().cloned());
    }
    if let Some(ref dir) = args.download_dir {
        builder = builder.download_dir(dir);
    }
    if args.keep_download {
        builder = builder.keep_download(true);
    }
    Ok(builder.show_progress(args.show_progress).build()?)
}

/// Where the rows are written
enum Target {
    Postgres(ConnectionParams),
    DuckDb(PathBuf),
}

async fn open_sink(target: &Target, show_progress: bool) -> Result<Box<dyn TableSink>, CliError> {
    match target {
        Target::DuckDb(path) => {
            println!("Target: DuckDB {}", path.display());
            Ok(Box::new(DuckDbSink::open(path)?))
        }
        Target::Postgres(params) => {
            let spinner = Spinner::new(
                &format!("Connecting to {}", params.redacted()),
                show_progress,
            );
            match PostgresSink::connect(params).await {
                Ok(sink) => {
                    spinner.finish_success(&format!("Connected to {}", sink.target()));
                    Ok(Box::new(sink))
                }
                Err(e) => {
                    spinner.finish_error("Connection failed");
                    Err(e.into())
                }
            }
        }
    }
}

/// Handle the ingest command
pub async fn handle_ingest(args: &IngestArgs) -> Result<(), CliError> {
    run_ingest(args, ConnectionParams::from_env()).await
}

async fn run_ingest(args: &IngestArgs, env: ConnectionParamsBuilder) -> Result<(), CliError> {
    let file = load_file_config(args)?;

    // Validate everything before touching the network
    let target = match args.duckdb {
        Some(ref path) => Target::DuckDb(path.clone()),
        None => Target::Postgres(build_connection_params(args, env, &file)?),
    };
    let config = build_ingest_config(args, &file)?;

    let mut sink = open_sink(&target, config.show_progress).await?;

    println!("Starting ingestion from: {}", config.source.display());
    println!("Table: {}", config.table_name);
    println!("Chunk size: {}", format_number(config.chunk_size as u64));

    let table_name = config.table_name.clone();
    let stats = Ingestor::new(config).run(sink.as_mut()).await?;
    print_summary(&table_name, &stats);

    Ok(())
}

fn print_summary(table_name: &str, stats: &IngestStats) {
    println!();
    println!("Ingestion complete:");
    println!("  Table:          {}", table_name);
    println!("  Rows ingested:  {}", format_number(stats.rows_ingested));
    println!("  Chunks:         {}", stats.chunk_count());
    println!("  Columns:        {}", stats.columns);
    if stats.bytes_downloaded > 0 {
        println!("  Downloaded:     {}", format_bytes(stats.bytes_downloaded));
    }
    println!("  Duration:       {}", stats.duration_string());
    println!(
        "  Throughput:     {} rows/s",
        format_number(stats.throughput() as u64)
    );
    if let Some(ref path) = stats.kept_download {
        println!("  Kept download:  {}", path.display());
    }
}
