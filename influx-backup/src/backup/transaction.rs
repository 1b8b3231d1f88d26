//! All-or-nothing guard for a backup run.
//!
//! Everything a run creates on disk is registered here. Unless [`BackupTransaction::commit`]
//! is called, dropping the guard removes it again: the run directory, the
//! destination root if this run created it, or else the watermark file if this
//! run created it. Removal is best effort; failures are logged for the operator.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug)]
pub struct BackupTransaction {
    destination: PathBuf,
    destination_created: bool,
    watermark_file: Option<PathBuf>,
    run_dir: Option<PathBuf>,
    committed: bool,
}

impl BackupTransaction {
    /// Start guarding `destination`; `created` says whether this run made it.
    pub fn begin(destination: &Path, created: bool) -> Self {
        Self {
            destination: destination.to_path_buf(),
            destination_created: created,
            watermark_file: None,
            run_dir: None,
            committed: false,
        }
    }

    /// Record a watermark file created by this run.
    pub fn created_watermark_file(&mut self, path: &Path) {
        self.watermark_file = Some(path.to_path_buf());
    }

    /// Record the run directory.
    pub fn created_run_dir(&mut self, path: &Path) {
        self.run_dir = Some(path.to_path_buf());
    }

    /// Keep everything.
    pub fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        if let Some(run_dir) = self.run_dir.take() {
            info!("Rolling back incomplete backup {}", run_dir.display());
            remove_dir(&run_dir);
        }

        if self.destination_created {
            remove_dir(&self.destination);
        } else if let Some(file) = self.watermark_file.take() {
            if let Err(e) = fs::remove_file(&file) {
                if e.kind() != ErrorKind::NotFound {
                    warn!(
                        "unable to delete file, delete {} manually! ({})",
                        file.display(),
                        e
                    );
                }
            }
        }
    }
}

impl Drop for BackupTransaction {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

fn remove_dir(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            "unable to delete dir, delete {} manually! ({})",
            dir.display(),
            e
        ),
    }
}
