// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Global Data Plane log-hosting engine
//!
//! Handle cache, request dispatch and subscriptions, independent of how
//! frames reach the daemon.

mod advertise;
mod cache;
mod chan;
mod config;
mod conn;
mod dispatch;
mod engine;
mod error;
mod handle;
mod log;
mod request;
mod subscr;
#[cfg(test)]
mod testing;

pub use advertise::{Advertiser, LogAdvertiser};
pub use cache::{HandleCache, Lookup};
pub use chan::Channel;
pub use config::{EngineConfig, ReclaimConfig, SubscrConfig};
pub use conn::Connection;
pub use dispatch::Nak;
pub use engine::{Engine, EngineDeps};
pub use error::{CacheError, TransitionError};
pub use handle::{Handle, HandleRef};
pub use log::LogState;
pub use request::{Request, RequestPool, RequestState};
pub use subscr::{datum_frame, EndReason, Subscription};

#[cfg(any(test, feature = "test-support"))]
pub use chan::MemoryChannel;
