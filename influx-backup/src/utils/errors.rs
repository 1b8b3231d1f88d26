//! Error types for the backup run.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("error querying database: {0}")]
    Query(String),

    #[error(
        "unable to parse watermark file {path}: {source}; delete {path} and try again \
         (this will back up the database from the beginning)"
    )]
    CorruptWatermark {
        path: PathBuf,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("incomplete download of measurement {measurement}: {reason}")]
    Export { measurement: String, reason: String },

    #[error("run directory {0} already exists")]
    DestinationExists(PathBuf),

    #[error("Backup cancelled")]
    Cancelled,
}

impl BackupError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        BackupError::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        ))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
