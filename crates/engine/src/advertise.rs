// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Announcing hosted logs to the routing layer

use gdp_core::GdpName;
use tracing::{debug, info};

/// Told about every log this daemon can serve
pub trait Advertiser: Send + Sync {
    fn advertise(&self, names: &[GdpName]);
}

/// Records advertisements in the daemon log; there is no router to tell
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAdvertiser;

impl Advertiser for LogAdvertiser {
    fn advertise(&self, names: &[GdpName]) {
        info!(count = names.len(), "advertising logs");
        for name in names {
            debug!(log = %name, "advertise");
        }
    }
}
