// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine unit tests

use gdp_core::metadata::ids;
use gdp_core::{FakeClock, GdpName, Metadata, NoVerifier, Verifier};
use gdp_protocol::Pdu;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::{Advertiser, Connection, Engine, EngineConfig, EngineDeps, MemoryChannel};

#[derive(Default)]
pub(crate) struct Recorder {
    pub names: Mutex<Vec<GdpName>>,
}

impl Advertiser for Recorder {
    fn advertise(&self, names: &[GdpName]) {
        self.names.lock().unwrap().extend_from_slice(names);
    }
}

pub(crate) struct Fixture {
    pub engine: Arc<Engine<FakeClock>>,
    pub clock: FakeClock,
    pub advertised: Arc<Recorder>,
    pub dir: TempDir,
}

pub(crate) fn daemon_name() -> GdpName {
    GdpName::from_alias("gdplogd.test")
}

/// Must be called inside a tokio runtime
pub(crate) fn fixture() -> Fixture {
    fixture_with(|c| c, Arc::new(NoVerifier))
}

pub(crate) fn fixture_with(
    configure: impl FnOnce(EngineConfig) -> EngineConfig,
    verifier: Arc<dyn Verifier>,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let advertised = Arc::new(Recorder::default());
    let engine = Engine::new(
        configure(EngineConfig::new(daemon_name(), dir.path())),
        EngineDeps {
            verifier,
            advertiser: advertised.clone(),
            runtime: tokio::runtime::Handle::current(),
        },
        clock.clone(),
    );
    Fixture {
        engine,
        clock,
        advertised,
        dir,
    }
}

pub(crate) fn metadata(tag: &str) -> Metadata {
    Metadata::new().with(ids::XID, tag.to_string()).unwrap()
}

pub(crate) fn connection(id: u64) -> (Connection, Arc<MemoryChannel>) {
    let chan = Arc::new(MemoryChannel::new(id));
    (Connection::new(chan.clone()), chan)
}

/// Wait until at least `n` frames were sent, or give up after a second
pub(crate) async fn wait_for(chan: &MemoryChannel, n: usize) -> Vec<Pdu> {
    for _ in 0..200 {
        if chan.len() >= n {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    chan.sent()
}
