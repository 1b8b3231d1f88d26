//! InfluxDB incremental backup library
//!
//! Dumps every measurement of a database, row by row newer than the last
//! successful run, into a timestamped directory per run.

pub mod backup;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod influx;
pub mod utils;
pub mod watermark;

// Re-export commonly used types
pub use backup::{run_backup, BackupExecutor};
pub use config::{Config, RunSettings};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
