//! Watermark file handling.
//!
//! The watermark is the Unix timestamp (seconds) of the last successful run.
//! Rows at or before it are considered already backed up. It lives in a single
//! decimal text file at the root of the backup destination.

use crate::utils::errors::{BackupError, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the watermark inside the destination directory.
pub const WATERMARK_FILE: &str = ".influxdb.last";

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Watermark(pub i64);

impl Watermark {
    /// "From the beginning of time."
    pub const ZERO: Watermark = Watermark(0);

    pub fn as_secs(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reads and writes `<dest>/.influxdb.last`. Single writer, no locking.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
}

impl WatermarkStore {
    pub fn new(destination: &Path) -> Self {
        Self {
            path: destination.join(WATERMARK_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the watermark.
    ///
    /// Returns `(watermark, existed)`. A missing file is created empty and
    /// yields `(0, false)`. Content that is not a base-10 integer is a fatal
    /// error and the file is left untouched.
    pub fn load(&self) -> Result<(Watermark, bool)> {
        if !self.path.exists() {
            fs::File::create(&self.path).map_err(|e| BackupError::io_at(&self.path, e))?;
            tracing::info!("Created watermark file {}", self.path.display());
            return Ok((Watermark::ZERO, false));
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| BackupError::io_at(&self.path, e))?;
        let secs = content
            .trim()
            .parse::<i64>()
            .map_err(|source| BackupError::CorruptWatermark {
                path: self.path.clone(),
                source,
            })?;

        Ok((Watermark(secs), true))
    }

    /// Overwrite the file with `"<secs>\n"`.
    pub fn store(&self, watermark: Watermark) -> Result<()> {
        fs::write(&self.path, format!("{}\n", watermark))
            .map_err(|e| BackupError::io_at(&self.path, e))
    }
}
