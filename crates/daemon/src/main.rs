// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Global Data Plane log server (gdplogd)
//!
//! Hosts logs under one storage root and serves them over TCP.

use clap::Parser;
use gdp_daemon::{lifecycle, Args, Config, LifecycleError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(&args)?;
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!(
        "Starting gdplogd on {} for {}",
        config.listen,
        config.engine.log_dir.display()
    );

    let mut daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            write_startup_error(&config, &e);
            error!(error = %e, "gdplogd failed to start");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(addr = %daemon.local_addr()?, "gdplogd ready");
    // Supervisors wait for this line
    println!("READY");

    daemon
        .run_until(async {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
            }
        })
        .await;

    daemon.shutdown()?;
    info!("Daemon stopped");
    Ok(())
}

/// First line gdplogd appends to its log file on each start.
/// Full format: "--- gdplogd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- gdplogd: starting (pid: ";

/// Append one line to the daemon log file, bypassing tracing
fn append_line(log_path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(log_path)?;
    writeln!(file, "{}", line)
}

fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    if let Some(log_path) = &config.log_path {
        let marker = format!("{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id());
        append_line(log_path, &marker)?;
    }
    Ok(())
}

/// The non-blocking writer may drop this on a failed start; write it directly
fn write_startup_error(config: &Config, error: &LifecycleError) {
    let line = format!("ERROR gdplogd failed to start: {}", error);
    match &config.log_path {
        Some(log_path) => {
            let _ = append_line(log_path, &line);
        }
        None => eprintln!("{}", line),
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (non_blocking, guard) = match &config.log_path {
        Some(log_path) => {
            let dir = match log_path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => std::path::Path::new("."),
            };
            let file_name = log_path.file_name().ok_or_else(|| {
                LifecycleError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("log file has no name: {}", log_path.display()),
                ))
            })?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
