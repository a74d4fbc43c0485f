//! ingest-data: download a CSV (or .csv.gz) and load it into PostgreSQL in chunks

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::ingest::{IngestArgs, handle_ingest};

#[derive(Parser, Debug)]
#[command(name = "ingest-data", version, about = "Ingest CSV data to Postgres", long_about = None)]
struct Args {
    /// User name for postgres [env: POSTGRES_USER]
    #[arg(long)]
    user: Option<String>,

    /// Password for postgres [env: POSTGRES_PASSWORD]
    #[arg(long)]
    password: Option<String>,

    /// Host for postgres [env: POSTGRES_HOST]
    #[arg(long)]
    host: Option<String>,

    /// Port for postgres [env: POSTGRES_PORT]
    #[arg(long)]
    port: Option<String>,

    /// Database name for postgres [env: POSTGRES_DB]
    #[arg(long)]
    db: Option<String>,

    /// Name of the table where we will write the results to
    #[arg(long = "table_name", alias = "table-name")]
    table_name: Option<String>,

    /// URL of the csv file (a local path is read in place)
    #[arg(long)]
    url: Option<String>,

    /// Rows per chunk [default: 100000]
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Columns coerced to timestamps, comma separated; pass "" to disable
    #[arg(long = "datetime-columns", alias = "datetime-column", value_delimiter = ',')]
    datetime_columns: Option<Vec<String>>,

    /// Directory for the temporary download
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Keep the downloaded file after ingestion
    #[arg(long)]
    keep_download: bool,

    /// Write into a DuckDB database file instead of PostgreSQL
    #[arg(long, value_name = "PATH")]
    duckdb: Option<PathBuf>,

    /// TOML file with default settings; flags and environment take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Args> for IngestArgs {
    fn from(args: Args) -> Self {
        IngestArgs {
            user: args.user,
            password: args.password,
            host: args.host,
            port: args.port,
            db: args.db,
            table_name: args.table_name,
            url: args.url,
            chunk_size: args.chunk_size,
            datetime_columns: args.datetime_columns,
            download_dir: args.download_dir,
            keep_download: args.keep_download,
            duckdb: args.duckdb,
            config: args.config,
            show_progress: !args.no_progress,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // Values from .env feed the POSTGRES_* fallbacks
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.verbose);

    match handle_ingest(&args.into()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
