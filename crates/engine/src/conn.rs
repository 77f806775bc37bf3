// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection state: the channel plus the logs its peers hold open

use gdp_core::{GdpName, IoMode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::chan::Channel;
use crate::handle::HandleRef;
use crate::log::LogState;

struct OpenLog {
    handle: HandleRef<LogState>,
    mode: IoMode,
}

/// One client connection as seen by the engine
pub struct Connection {
    channel: Arc<dyn Channel>,
    /// Keyed by (log, opener)
    open: Mutex<HashMap<(GdpName, GdpName), OpenLog>>,
}

impl Connection {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.channel.id()
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(GdpName, GdpName), OpenLog>> {
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember an open; a repeated open widens the mode and keeps one lease
    pub(crate) fn hold(&self, log: GdpName, opener: GdpName, handle: HandleRef<LogState>, mode: IoMode) {
        let mut open = self.lock();
        match open.get_mut(&(log, opener)) {
            Some(existing) => existing.mode = existing.mode.union(mode),
            None => {
                open.insert((log, opener), OpenLog { handle, mode });
            }
        }
    }

    /// The opener's lease and mode, if it opened the log here
    pub(crate) fn lease(&self, log: &GdpName, opener: &GdpName) -> Option<(HandleRef<LogState>, IoMode)> {
        self.lock()
            .get(&(*log, *opener))
            .map(|o| (o.handle.clone(), o.mode))
    }

    /// Drop the opener's lease; false if it had none
    pub(crate) fn release(&self, log: &GdpName, opener: &GdpName) -> bool {
        let removed = self.lock().remove(&(*log, *opener));
        removed.is_some()
    }

    /// Drop every lease (disconnect)
    pub(crate) fn release_all(&self) -> usize {
        let drained: Vec<OpenLog> = self.lock().drain().map(|(_, o)| o).collect();
        let count = drained.len();
        drop(drained);
        count
    }

    pub fn open_count(&self) -> usize {
        self.lock().len()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}
