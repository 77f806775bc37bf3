// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, the serve loop, shutdown.

use std::fs::File;
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use gdp_core::{GdpError, NoVerifier, ParamsError, SystemClock};
use gdp_engine::{Engine, EngineDeps, LogAdvertiser};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::server;

/// Engine with the real clock
pub type DaemonEngine = Engine<SystemClock>;

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: TcpListener,
    pub engine: Arc<DaemonEngine>,
    /// Bounds how many commands execute at once across all connections
    pub workers: Arc<Semaphore>,
    pub start_time: Instant,
    next_conn: u64,
}

impl std::fmt::Debug for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonState")
            .field("config", &self.config)
            .field("listener", &self.listener)
            .field("start_time", &self.start_time)
            .field("next_conn", &self.next_conn)
            .finish_non_exhaustive()
    }
}

impl DaemonState {
    /// Address actually bound (differs from the config when port 0 was asked for)
    pub fn local_addr(&self) -> Result<SocketAddr, LifecycleError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections and run periodic maintenance until `shutdown` resolves
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) {
        let mut reclaim = tokio::time::interval(self.config.engine.reclaim.interval);
        reclaim.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => error!("Error accepting connection: {}", e),
                    }
                }

                _ = reclaim.tick() => {
                    let engine = Arc::clone(&self.engine);
                    // Dropping handles closes files; keep that off the reactor
                    let reclaimed = tokio::task::spawn_blocking(move || engine.reclaim()).await;
                    if let Err(e) = reclaimed {
                        error!("Reclaim task failed: {}", e);
                    }
                }

                _ = sweep.tick() => {
                    self.engine.sweep_subscriptions();
                }

                _ = &mut shutdown => break,
            }
        }
    }

    fn spawn_connection(&mut self, stream: tokio::net::TcpStream, peer: SocketAddr) {
        self.next_conn += 1;
        let conn_id = self.next_conn;
        let engine = Arc::clone(&self.engine);
        let workers = Arc::clone(&self.workers);
        let outbound = self.config.outbound_queue;
        tokio::spawn(async move {
            if let Err(e) =
                server::handle_connection(engine, workers, outbound, conn_id, stream, peer).await
            {
                warn!(conn = conn_id, %peer, "connection ended with error: {}", e);
            }
        });
    }

    /// Shutdown the daemon gracefully
    pub fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        // Stop new work before ending subscriptions
        self.workers.close();
        self.engine.shutdown();

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Daemon shutdown complete"
        );
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("Invalid listen address: {0}")]
    BadListen(String),

    #[error("Parameter error: {0}")]
    Params(#[from] ParamsError),

    #[error("Engine error: {0}")]
    Engine(#[from] GdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        Err(e) => {
            cleanup_on_failure(config, &e);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create the storage root (the PID file defaults to living there)
    std::fs::create_dir_all(&config.engine.log_dir)?;
    if let Some(parent) = config.lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire lock file FIRST - one daemon per storage root
    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Build the engine
    let engine = Engine::new(
        config.engine.clone(),
        EngineDeps {
            verifier: Arc::new(NoVerifier),
            advertiser: Arc::new(LogAdvertiser),
            runtime: tokio::runtime::Handle::current(),
        },
        SystemClock,
    );

    // 4. Announce what is already on disk
    let hosted = engine.advertise_hosted()?;

    // 5. Bind (LAST - only after all validation passes)
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen, e))?;

    info!(
        name = %config.engine.name,
        log_dir = %config.engine.log_dir.display(),
        hosted,
        workers = config.workers,
        "Daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        engine,
        workers: Arc::new(Semaphore::new(config.workers)),
        start_time: Instant::now(),
        next_conn: 0,
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config, error: &LifecycleError) {
    // Another daemon owns the PID file
    if matches!(error, LifecycleError::LockFailed(_)) {
        return;
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
