// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration

use gdp_core::{GdpName, SignaturePolicy};
use gdp_storage::StoreOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// When idle log handles are closed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimConfig {
    /// Unreferenced handles idle this long are closed
    #[serde(with = "humantime_serde")]
    pub age: Duration,
    /// How often the daemon sweeps the cache
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            age: Duration::from_secs(300),
            interval: Duration::from_secs(15),
        }
    }
}

/// Subscription liveness
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscrConfig {
    /// Silence after which a keepalive probe is sent
    #[serde(with = "humantime_serde")]
    pub poke_interval: Duration,
    /// Silence after which the subscription is torn down
    #[serde(with = "humantime_serde")]
    pub dead_interval: Duration,
}

impl Default for SubscrConfig {
    fn default() -> Self {
        Self {
            poke_interval: Duration::from_secs(10),
            dead_interval: Duration::from_secs(60),
        }
    }
}

/// Everything the engine needs to serve logs
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Name the daemon answers to for CREATE and PING
    pub name: GdpName,
    /// Root of the on-disk log tree
    pub log_dir: PathBuf,
    pub store: StoreOptions,
    pub policy: SignaturePolicy,
    pub reclaim: ReclaimConfig,
    pub subscr: SubscrConfig,
}

impl EngineConfig {
    pub fn new(name: GdpName, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            name,
            log_dir: log_dir.into(),
            store: StoreOptions::default(),
            policy: SignaturePolicy::NONE,
            reclaim: ReclaimConfig::default(),
            subscr: SubscrConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_subscr(mut self, subscr: SubscrConfig) -> Self {
        self.subscr = subscr;
        self
    }
}
