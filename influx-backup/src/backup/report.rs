//! Summary of a committed backup run.

use crate::utils::format::{format_bytes, format_duration};
use crate::watermark::Watermark;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub run_dir: PathBuf,
    pub previous_watermark: Watermark,
    pub new_watermark: Watermark,
    pub measurements: Vec<ExportedMeasurement>,
    pub duration: Duration,
}

/// One `<measurement>.json` file written by the run.
#[derive(Debug, Clone)]
pub struct ExportedMeasurement {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

impl BackupReport {
    pub fn total_bytes(&self) -> u64 {
        self.measurements.iter().map(|m| m.bytes).sum()
    }

    /// One-line summary for the log.
    pub fn summary(&self) -> String {
        format!(
            "{} measurements, {} into {} in {} (watermark {} -> {})",
            self.measurements.len(),
            format_bytes(self.total_bytes()),
            self.run_dir.display(),
            format_duration(self.duration),
            self.previous_watermark,
            self.new_watermark,
        )
    }
}
