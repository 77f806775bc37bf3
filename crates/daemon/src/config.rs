// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: parameter file plus command-line overrides

use clap::Parser;
use gdp_core::{GdpName, Params, SignaturePolicy};
use gdp_engine::{EngineConfig, ReclaimConfig, SubscrConfig};
use gdp_protocol::DEFAULT_PORT;
use gdp_storage::StoreOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

pub const DEFAULT_LOG_DIR: &str = "/var/swarm/gdp/logs";
pub const DEFAULT_WORKERS: u64 = 4;
pub const DEFAULT_OUTBOUND_QUEUE: u64 = 1024;

/// Command line for `gdplogd`
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "gdplogd", version, about = "Global Data Plane log server")]
pub struct Args {
    /// Parameter file (TOML); missing is fine
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root of the log storage tree
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Name (alias) this daemon answers to
    #[arg(short = 'n', long)]
    pub name: Option<String>,
}

/// Resolved daemon settings
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    /// Worker pool size; bounds concurrent command execution
    pub workers: usize,
    /// Frames queued per connection before sends start failing
    pub outbound_queue: usize,
    /// PID file, held under an exclusive lock while running
    pub lock_path: PathBuf,
    /// Diagnostic log; stderr when unset
    pub log_path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Config {
    /// Load the parameter file named by `args` and apply overrides
    pub fn load(args: &Args) -> Result<Self, LifecycleError> {
        let params = match &args.config {
            Some(path) => Params::load(path)?,
            None => Params::new(),
        };
        Self::from_params(&params, args)
    }

    pub fn from_params(params: &Params, args: &Args) -> Result<Self, LifecycleError> {
        let log_dir = match &args.log_dir {
            Some(dir) => dir.clone(),
            None => PathBuf::from(params.get_str("swarm.gdplogd.log.dir", DEFAULT_LOG_DIR)?),
        };

        let listen = params.get_str(
            "swarm.gdplogd.listen",
            &format!("0.0.0.0:{}", DEFAULT_PORT),
        )?;
        let mut listen: SocketAddr = listen
            .parse()
            .map_err(|_| LifecycleError::BadListen(listen.clone()))?;
        if let Some(port) = args.port {
            listen.set_port(port);
        }

        let name = match &args.name {
            Some(alias) => alias.clone(),
            None => params.get_str("swarm.gdplogd.name", "gdplogd")?,
        };

        let policy: SignaturePolicy = params
            .get_str("swarm.gdplogd.crypto.strictness", "none")?
            .parse()?;

        let workers = params.get_u64("swarm.gdplogd.workers", DEFAULT_WORKERS)?.max(1) as usize;
        let outbound_queue = params
            .get_u64("swarm.gdplogd.outbound.queue", DEFAULT_OUTBOUND_QUEUE)?
            .max(1) as usize;

        let lock_path = match params.get_opt_str("swarm.gdplogd.pid.file")? {
            Some(path) => PathBuf::from(path),
            None => log_dir.join("gdplogd.pid"),
        };
        let log_path = params
            .get_opt_str("swarm.gdplogd.daemon.file")?
            .map(PathBuf::from);

        let reclaim_defaults = ReclaimConfig::default();
        let subscr_defaults = SubscrConfig::default();
        let mut engine = EngineConfig::new(GdpName::parse_or_alias(&name), log_dir)
            .with_policy(policy)
            .with_subscr(SubscrConfig {
                poke_interval: params
                    .get_duration("swarm.gdplogd.subscr.pokeintvl", subscr_defaults.poke_interval)?,
                dead_interval: params
                    .get_duration("swarm.gdplogd.subscr.deadintvl", subscr_defaults.dead_interval)?,
            });
        engine.reclaim = ReclaimConfig {
            age: params.get_duration("swarm.gdplogd.reclaim.age", reclaim_defaults.age)?,
            interval: params
                .get_duration("swarm.gdplogd.reclaim.interval", reclaim_defaults.interval)?,
        };
        engine.store = StoreOptions {
            sync: params.get_bool("swarm.gdplogd.sync", false)?,
        };

        Ok(Self {
            listen,
            workers,
            outbound_queue,
            lock_path,
            log_path,
            engine,
        })
    }

    /// How often idle subscriptions are probed and swept
    pub fn sweep_interval(&self) -> Duration {
        self.engine.subscr.poke_interval
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
