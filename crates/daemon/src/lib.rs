// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gdplogd: Global Data Plane log server
//!
//! TCP front end, worker pool and lifecycle around [`gdp_engine::Engine`].

pub mod config;
pub mod lifecycle;
pub mod server;

pub use config::{Args, Config};
pub use lifecycle::{startup, DaemonEngine, DaemonState, LifecycleError};
pub use server::{handle_connection, ServerError, TcpChannel};
