//! expensa - a terminal client for the expense tracker.
//!
//! Every command that touches expense data checks the stored session first,
//! refreshing the access token in the background when it has expired.

mod cli;
mod commands;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use expensa_core::Config;

use cli::Cli;
use commands::{App, Outcome};

/// Log file prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "expensa.log";

/// Initialize the tracing subscriber for logging.
///
/// Console output goes to stderr; when the cache directory is known, a
/// daily-rolling file log is written there as well.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_tracing(&config);
    info!("expensa starting");

    match run(config, cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_status()),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, cli: Cli) -> Result<Outcome> {
    let mut app = App::new(config, cli.api_url)?;
    app.run(cli.command).await
}
