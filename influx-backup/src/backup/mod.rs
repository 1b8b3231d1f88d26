//! Backup run executor - Orchestrates one incremental backup.
//!
//! A run walks through these stages, strictly in order:
//! - make sure the destination exists
//! - load (or create) the watermark
//! - create the timestamped run directory
//! - list the measurements of the database
//! - export every measurement newer than the watermark, one at a time
//! - store the new watermark and commit
//!
//! The first failure aborts the run, and the [`BackupTransaction`] guard
//! removes whatever the run created.

pub mod layout;
pub mod report;
pub mod transaction;

use crate::config::RunSettings;
use crate::influx::{select_since, InfluxClient};
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::{format_bytes, format_rate};
use crate::watermark::{Watermark, WatermarkStore};
use chrono::{DateTime, Local};
use layout::{export_file_name, Destination};
use report::{BackupReport, ExportedMeasurement};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use transaction::BackupTransaction;

/// Stages of a run, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    DestReady,
    RunDirReady,
    Enumerating,
    Exporting { index: usize, total: usize },
    Committing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "INIT"),
            RunState::DestReady => write!(f, "DEST_READY"),
            RunState::RunDirReady => write!(f, "RUNDIR_READY"),
            RunState::Enumerating => write!(f, "ENUMERATING"),
            RunState::Exporting { index, total } => write!(f, "EXPORTING({}/{})", index, total),
            RunState::Committing => write!(f, "COMMITTING"),
            RunState::Done => write!(f, "DONE"),
        }
    }
}

/// Main backup executor
pub struct BackupExecutor {
    settings: RunSettings,
    client: InfluxClient,
    cancel_token: CancellationToken,
}

impl BackupExecutor {
    /// Create a new backup executor (no cancellation support)
    pub fn new(settings: RunSettings) -> Result<Self> {
        Self::with_cancel(settings, CancellationToken::new())
    }

    /// Create a new backup executor with cancellation support
    pub fn with_cancel(settings: RunSettings, cancel_token: CancellationToken) -> Result<Self> {
        let client = InfluxClient::new(&settings)?;
        Ok(Self {
            settings,
            client,
            cancel_token,
        })
    }

    /// Execute a backup run started now.
    pub async fn execute(&self) -> Result<BackupReport> {
        self.execute_at(Local::now()).await
    }

    /// Execute a backup run that started at `started`.
    ///
    /// `started` names the run directory and becomes the new watermark.
    pub async fn execute_at(&self, started: DateTime<Local>) -> Result<BackupReport> {
        let clock = Instant::now();
        let database = self.settings.database.as_str();
        let mut state = RunState::Init;
        debug!("Backup of {}: {}", database, state);

        let result = self.run(started, clock, &mut state).await;

        match &result {
            Ok(report) => info!("Backup of {} complete: {}", database, report.summary()),
            Err(e) => error!("Backup of {} failed during {}: {}", database, state, e),
        }

        result
    }

    async fn run(
        &self,
        started: DateTime<Local>,
        clock: Instant,
        state: &mut RunState,
    ) -> Result<BackupReport> {
        let database = self.settings.database.as_str();

        let destination = Destination::ensure(&self.settings.destination)?;
        let mut txn = BackupTransaction::begin(destination.root(), destination.created());
        advance(state, RunState::DestReady);

        let store = WatermarkStore::new(destination.root());
        let (previous, existed) = store.load()?;
        if existed {
            info!("Backing up {} since watermark {}", database, previous);
        } else {
            txn.created_watermark_file(store.path());
            info!("No previous backup of {}, backing up everything", database);
        }

        let run_dir = destination.create_run_dir(&started)?;
        txn.created_run_dir(&run_dir);
        advance(state, RunState::RunDirReady);

        advance(state, RunState::Enumerating);
        let measurements = self
            .cancellable(self.client.show_measurements(database))
            .await?;
        info!("Found {} measurements in {}", measurements.len(), database);

        let total = measurements.len();
        let mut exported = Vec::with_capacity(total);
        for (idx, measurement) in measurements.into_iter().enumerate() {
            advance(
                state,
                RunState::Exporting {
                    index: idx + 1,
                    total,
                },
            );
            let export = self.export_measurement(&measurement, previous, &run_dir).await?;
            exported.push(export);
        }

        advance(state, RunState::Committing);
        let new_watermark = next_watermark(previous, &started);
        store.store(new_watermark)?;
        txn.commit();
        advance(state, RunState::Done);

        Ok(BackupReport {
            run_dir,
            previous_watermark: previous,
            new_watermark,
            measurements: exported,
            duration: clock.elapsed(),
        })
    }

    /// Download one measurement into `<run_dir>/<measurement>.json`.
    async fn export_measurement(
        &self,
        measurement: &str,
        since: Watermark,
        run_dir: &Path,
    ) -> Result<ExportedMeasurement> {
        let path = run_dir.join(export_file_name(measurement));
        info!("downloading {} into {}", measurement, path.display());

        let started = Instant::now();
        let query = select_since(measurement, since);
        let bytes = self
            .cancellable(self.client.export(&self.settings.database, &query, &path))
            .await
            .map_err(|e| match e {
                BackupError::Cancelled => BackupError::Cancelled,
                other => BackupError::Export {
                    measurement: measurement.to_string(),
                    reason: other.to_string(),
                },
            })?;

        info!(
            "Downloaded {}: {} ({})",
            measurement,
            format_bytes(bytes),
            format_rate(bytes, started.elapsed())
        );

        Ok(ExportedMeasurement {
            name: measurement.to_string(),
            path,
            bytes,
        })
    }

    /// Race `fut` against cancellation.
    async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(BackupError::Cancelled),
            result = fut => result,
        }
    }
}

/// Convenience wrapper: build an executor and run it once.
pub async fn run_backup(
    settings: RunSettings,
    cancel_token: CancellationToken,
) -> Result<BackupReport> {
    BackupExecutor::with_cancel(settings, cancel_token)?
        .execute()
        .await
}

fn advance(state: &mut RunState, next: RunState) {
    debug!("{} -> {}", state, next);
    *state = next;
}

/// The run's start time, never below the previous watermark.
fn next_watermark(previous: Watermark, started: &DateTime<Local>) -> Watermark {
    previous.max(Watermark(started.timestamp()))
}
