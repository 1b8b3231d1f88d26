//! influx-backup - Main entry point
//!
//! Incremental backup of one InfluxDB database into `<dest>/<timestamp>/`.

use anyhow::Result;
use clap::CommandFactory;
use influx_backup::{
    backup::BackupExecutor, cli::Args, config::Config, daemon::shutdown::ShutdownCoordinator,
    utils, BackupError,
};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse_normalized();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be up yet if the config itself was the problem.
            eprintln!("{:#}", e);
            if matches!(e.downcast_ref::<BackupError>(), Some(BackupError::Config(_))) {
                eprintln!();
                let _ = Args::command().print_help();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    let settings = config.resolve()?;

    tracing::info!(
        "Starting influx-backup v{} ({} on {})",
        env!("CARGO_PKG_VERSION"),
        settings.database,
        settings.base_url
    );

    let shutdown = ShutdownCoordinator::new();
    let listener = shutdown.listen();

    let executor = BackupExecutor::with_cancel(settings, shutdown.token())?;
    let result = executor.execute().await;

    // Stop the signal listener
    shutdown.trigger();
    let _ = listener.await;

    result?;
    Ok(())
}
