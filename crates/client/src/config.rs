// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration

use gdp_core::{Params, ParamsError};
use gdp_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a client reaches the daemon and how hard it tries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the daemon (or a router in front of it)
    pub router: String,
    /// How long one attempt waits for its response
    #[serde(with = "humantime_serde")]
    pub invoke_timeout: Duration,
    /// Attempts per request, including the first
    pub invoke_retries: u32,
    /// Give up on an open at the first routing failure
    pub open_failfast: bool,
    /// Alias used as the source name of requests; generated when unset
    pub name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            router: format!("127.0.0.1:{}", DEFAULT_PORT),
            invoke_timeout: Duration::from_secs(10),
            invoke_retries: 3,
            open_failfast: false,
            name: None,
        }
    }
}

impl ClientConfig {
    pub fn from_params(params: &Params) -> Result<Self, ParamsError> {
        let defaults = Self::default();
        Ok(Self {
            router: params.get_str("swarm.gdp.router.addr", &defaults.router)?,
            invoke_timeout: params.get_duration("swarm.gdp.invoke.timeout", defaults.invoke_timeout)?,
            invoke_retries: params
                .get_u64("swarm.gdp.invoke.retries", u64::from(defaults.invoke_retries))?
                .clamp(1, u64::from(u32::MAX)) as u32,
            open_failfast: params.get_bool("swarm.gdp.open.failfast", defaults.open_failfast)?,
            name: params.get_opt_str("swarm.gdp.client.name")?,
        })
    }

    pub fn with_router(mut self, router: impl Into<String>) -> Self {
        self.router = router.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.invoke_retries = retries;
        self
    }

    pub fn with_failfast(mut self, failfast: bool) -> Self {
        self.open_failfast = failfast;
        self
    }
}
