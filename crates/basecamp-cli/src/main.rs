//! basecamp - command-line client that keeps working offline.
//!
//! Reads are served from a local cache while fresh; writes made while the
//! service is unreachable are queued on disk and sent on the next `sync`
//! (or automatically under `watch`).

mod cli;
mod commands;
mod config;
mod credentials;
mod probe;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command};
use commands::Session;
use config::Config;

/// Log file name prefix inside `--log-dir`
const LOG_FILE_PREFIX: &str = "basecamp.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=basecamp_core=debug).
/// The returned guard must be held until exit so buffered file logs flush.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref());
    info!(command = ?cli.command, "basecamp starting");

    let mut config = Config::load()?;

    match cli.command {
        // Credential commands work without a reachable or even configured service
        Command::Login { username } => commands::login(&mut config, &username),
        Command::Logout { username } => commands::logout(&mut config, &username),
        command => {
            let session = Session::open(config, cli.base_url, cli.offline).await?;
            commands::run(session, command).await
        }
    }
}
