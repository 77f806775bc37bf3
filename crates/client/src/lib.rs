// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gdp-client: async client for Global Data Plane log servers
//!
//! One [`GdpClient`] owns one connection. Requests are correlated with
//! their responses by request id; subscriptions arrive as a stream of
//! [`SubscriptionEvent`]s.

mod client;
mod config;
mod error;
mod log;
mod subscription;

pub use client::GdpClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use log::{Log, LogInfo};
pub use subscription::{Subscription, SubscriptionEvent};
