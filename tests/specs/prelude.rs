//! Shared harness: a real daemon on a loopback port and clients for it

pub use bytes::Bytes;
pub use gdp_client::{ClientConfig, GdpClient, Log, Subscription, SubscriptionEvent};
pub use gdp_core::metadata::ids;
pub use gdp_core::{ErrorKind, GdpName, IoMode, Metadata, Params};
pub use std::time::Duration;

use gdp_daemon::{startup, Args, Config, DaemonState, LifecycleError};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Bound on any single wait in a scenario
pub const WAIT: Duration = Duration::from_secs(5);

/// A running daemon. Stopped when dropped; its log directory outlives
/// restarts.
pub struct Daemon {
    dir: TempDir,
    addr: SocketAddr,
    name: GdpName,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

pub fn config_for(dir: &Path) -> Config {
    let args = Args {
        log_dir: Some(dir.to_path_buf()),
        name: Some("gdplogd.specs".into()),
        ..Args::default()
    };
    let mut config = Config::from_params(&Params::new(), &args).unwrap();
    config.listen = "127.0.0.1:0".parse().unwrap();
    config
}

async fn launch(config: &Config) -> Result<(SocketAddr, oneshot::Sender<()>, JoinHandle<()>), LifecycleError> {
    let mut state: DaemonState = startup(config).await?;
    let addr = state.local_addr()?;
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        state
            .run_until(async {
                let _ = stopped.await;
            })
            .await;
        let _ = state.shutdown();
    });
    Ok((addr, stop, task))
}

impl Daemon {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let (addr, stop, task) = launch(&config).await.unwrap();
        Self {
            dir,
            addr,
            name: config.engine.name,
            stop: Some(stop),
            task: Some(task),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Name CREATE requests are addressed to
    pub fn name(&self) -> GdpName {
        self.name
    }

    /// Stop and wait for shutdown to finish
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
        }
    }

    /// Stop, then start again over the same log directory
    pub async fn restart(&mut self) {
        self.stop().await;
        let config = config_for(self.dir.path());
        let (addr, stop, task) = launch(&config).await.unwrap();
        self.addr = addr;
        self.stop = Some(stop);
        self.task = Some(task);
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_router(self.addr.to_string())
            .with_timeout(Duration::from_secs(2))
            .with_retries(2)
    }

    pub async fn client(&self) -> GdpClient {
        GdpClient::connect(self.client_config()).await.unwrap()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

pub fn metadata(tag: &str) -> Metadata {
    Metadata::new()
        .with(ids::XID, tag.to_string())
        .unwrap()
        .with(ids::CTIME, "2026-01-01T00:00:00Z")
        .unwrap()
}

/// Create a log named after its metadata
pub async fn create(client: &GdpClient, daemon: &Daemon, tag: &str) -> Log {
    client
        .create_log(daemon.name(), GdpName::ZERO, &metadata(tag))
        .await
        .unwrap()
}

/// Next subscription event, failing the scenario if none arrives in time
pub async fn next_event(sub: &mut Subscription) -> Option<SubscriptionEvent> {
    tokio::time::timeout(WAIT, sub.next()).await.unwrap()
}

pub fn data_of(event: Option<SubscriptionEvent>) -> (i64, Bytes) {
    match event {
        Some(SubscriptionEvent::Data(d)) => (d.recno, d.data),
        other => panic!("expected a record, got {:?}", other),
    }
}
