//! calbar: a tray calendar aggregator daemon.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use calbar_core::{TracingConfig, init_tracing};
use calbar_daemon::{App, Config, ShutdownHandle};

#[derive(Debug, Parser)]
#[command(name = "calbar", about = "Aggregates remote calendars into a desktop view")]
struct Cli {
    /// Path to the config file (default: ~/.config/calbar/config.yaml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.verbose {
        TracingConfig::verbose()
    } else {
        TracingConfig::default()
    };
    if let Err(err) = init_tracing(tracing_config) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load config");
            return ExitCode::FAILURE;
        }
    };

    info!(
        interval = ?config.sync.interval,
        time_range = ?config.ui.time_range,
        "starting calbar"
    );

    let app = match App::new(config) {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = ShutdownHandle::new();
    shutdown.spawn_listener();

    app.run(shutdown.subscribe()).await;
    ExitCode::SUCCESS
}
