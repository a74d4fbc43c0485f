//! Error type for the ingest-data binary

use ingest_data::ingest::{ConfigError, IngestError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl CliError {
    /// Message printed before exiting with a failure status
    pub fn user_message(&self) -> String {
        match self {
            CliError::Config(err) => err.user_message(),
            CliError::Ingest(err) => err.user_message(),
        }
    }
}
