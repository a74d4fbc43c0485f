//! Error types for configuration and ingestion

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling configuration, before any I/O happens
#[derive(Error, Debug)]
pub enum ConfigError {
    /// One or more PostgreSQL connection parameters are absent
    #[error("Missing connection parameters: {}", .0.join(", "))]
    MissingConnectionParams(Vec<&'static str>),

    /// Port is not a valid TCP port number
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// A required setting was not provided
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    /// A setting was provided but is unusable
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Config file could not be read
    #[error("Cannot read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this tool
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors that can occur during ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Source could not be downloaded
    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// Local source file does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Source has no header row
    #[error("Source is empty: {0}")]
    EmptySource(String),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A configured column is absent from the source header
    #[error("Column '{0}' not found in source header")]
    MissingColumn(String),

    /// A value does not fit the type inferred for its column
    #[error(
        "Cannot coerce value '{value}' in column '{column}' (line {line}, chunk {chunk}) to {expected}"
    )]
    Coercion {
        chunk: usize,
        line: u64,
        column: String,
        value: String,
        expected: &'static str,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::MissingConnectionParams(fields) => {
                let flags = fields
                    .iter()
                    .map(|f| format!("--{f} (or {})", env_var_for(f)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "One or more PostgreSQL connection parameters are missing: {}\n\n\
                    Hint: Provide {flags}.",
                    fields.join(", ")
                )
            }
            ConfigError::InvalidPort(port) => {
                format!("Invalid port: {port}\n\nHint: The port must be a number between 1 and 65535.")
            }
            ConfigError::ReadFile { path, source } => {
                format!(
                    "Cannot read config file {}: {source}\n\nHint: Check the --config path.",
                    path.display()
                )
            }
            _ => self.to_string(),
        }
    }
}

impl IngestError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            IngestError::Config(err) => err.user_message(),
            IngestError::Download { url, reason } => {
                format!(
                    "Download failed: {url}\nReason: {reason}\n\n\
                    Hint: Check the URL and your network connectivity."
                )
            }
            IngestError::FileNotFound(path) => {
                format!(
                    "File not found: {}\n\nHint: Check that the file exists and the path is correct.",
                    path.display()
                )
            }
            IngestError::MissingColumn(column) => {
                format!(
                    "Column '{column}' not found in source header.\n\n\
                    Hint: Use --datetime-columns to name the timestamp columns of this dataset."
                )
            }
            IngestError::Coercion { .. } => {
                format!(
                    "{self}\n\nHint: The table schema is inferred from the first chunk. \
                    Increase --chunk-size so the first chunk is representative."
                )
            }
            IngestError::Csv(err) => {
                format!("CSV error: {err}\n\nHint: Check that the source is a CSV file and that the .gz suffix matches its compression.")
            }
            _ => self.to_string(),
        }
    }
}

fn env_var_for(field: &str) -> &'static str {
    match field {
        "user" => "POSTGRES_USER",
        "password" => "POSTGRES_PASSWORD",
        "host" => "POSTGRES_HOST",
        "port" => "POSTGRES_PORT",
        "db" => "POSTGRES_DB",
        _ => "an environment variable",
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(err: reqwest::Error) -> Self {
        IngestError::Download {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            reason: err.without_url().to_string(),
        }
    }
}

#[cfg(feature = "postgres-backend")]
impl From<tokio_postgres::Error> for IngestError {
    fn from(err: tokio_postgres::Error) -> Self {
        IngestError::Database(err.to_string())
    }
}

#[cfg(feature = "duckdb-backend")]
impl From<duckdb::Error> for IngestError {
    fn from(err: duckdb::Error) -> Self {
        IngestError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_params_lists_every_field() {
        let err = ConfigError::MissingConnectionParams(vec!["user", "port"]);
        assert_eq!(err.to_string(), "Missing connection parameters: user, port");

        let msg = err.user_message();
        assert!(msg.contains("POSTGRES_USER"));
        assert!(msg.contains("POSTGRES_PORT"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_config_error_wraps_transparently() {
        let err: IngestError = ConfigError::MissingSetting("url").into();
        assert_eq!(err.to_string(), "Missing required setting: url");
    }

    #[test]
    fn test_coercion_message() {
        let err = IngestError::Coercion {
            chunk: 2,
            line: 201,
            column: "passenger_count".to_string(),
            value: "1.5".to_string(),
            expected: "BIGINT",
        };
        let display = err.to_string();
        assert!(display.contains("passenger_count"));
        assert!(display.contains("line 201"));
        assert!(err.user_message().contains("--chunk-size"));
    }
}
