//! On-disk layout of the backup destination.
//!
//! ```text
//! <dest>/
//!   .influxdb.last
//!   2024_05_01_03_00_00/
//!     cpu.json
//!     mem.json
//! ```

use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Destination root, remembering whether this run created it.
#[derive(Debug, Clone)]
pub struct Destination {
    root: PathBuf,
    created: bool,
}

impl Destination {
    /// Make sure the destination directory exists.
    pub fn ensure(root: &Path) -> Result<Self> {
        if root.is_dir() {
            return Ok(Self {
                root: root.to_path_buf(),
                created: false,
            });
        }

        fs::create_dir(root).map_err(|e| {
            BackupError::Config(format!(
                "unable to create/find destination dir {}: {}",
                root.display(),
                e
            ))
        })?;
        tracing::info!("Created destination dir {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            created: true,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `ensure` had to create the root.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Create `<root>/<YYYY_MM_DD_HH_MM_SS>` for a run started at `started`.
    ///
    /// An existing directory with the same name is an error; it belongs to
    /// another run and must not be adopted (or later rolled back) by this one.
    pub fn create_run_dir<Tz>(&self, started: &DateTime<Tz>) -> Result<PathBuf>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let dir = self.root.join(run_dir_name(started));
        match fs::create_dir(&dir) {
            Ok(()) => Ok(dir),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(BackupError::DestinationExists(dir))
            }
            Err(e) => Err(BackupError::io_at(&dir, e)),
        }
    }
}

/// `YYYY_MM_DD_HH_MM_SS`
pub fn run_dir_name<Tz>(started: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    started.format("%Y_%m_%d_%H_%M_%S").to_string()
}

/// `<measurement>.json`, with `%`, path separators and NUL percent-escaped.
///
/// The mapping is injective, so distinct measurements never share a file, and
/// the file always lands directly inside the run directory.
pub fn export_file_name(measurement: &str) -> String {
    let mut safe = String::with_capacity(measurement.len() + 5);
    for c in measurement.chars() {
        match c {
            '%' => safe.push_str("%25"),
            '/' => safe.push_str("%2F"),
            '\\' => safe.push_str("%5C"),
            '\0' => safe.push_str("%00"),
            c => safe.push(c),
        }
    }
    safe.push_str(".json");
    safe
}
