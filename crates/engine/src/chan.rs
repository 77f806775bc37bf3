// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound side of a client connection

use gdp_core::Result;
use gdp_protocol::Pdu;

/// Where responses and subscription deliveries for one connection go.
///
/// `send` must not block on the network; implementations queue the frame
/// for a writer. A `RoutingFailure` means the connection is gone; any
/// other error means the queue is full.
pub trait Channel: Send + Sync {
    /// Identifies the connection in logs and subscription bookkeeping
    fn id(&self) -> u64;

    fn send(&self, pdu: &Pdu) -> Result<()>;

    /// Frames that can be queued right now; `None` if the queue is unbounded
    fn room(&self) -> Option<usize> {
        None
    }
}

#[cfg(any(test, feature = "test-support"))]
mod memory {
    use super::*;
    use gdp_core::{ErrorKind, GdpError};
    use gdp_protocol::Command;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records every frame sent; can be closed to simulate a dead peer.
    ///
    /// A bounded channel counts frames not yet taken against its limit,
    /// like a writer that has stalled.
    #[derive(Debug, Default)]
    pub struct MemoryChannel {
        id: u64,
        sent: Mutex<Vec<Pdu>>,
        closed: AtomicBool,
        limit: Option<usize>,
    }

    impl MemoryChannel {
        pub fn new(id: u64) -> Self {
            Self {
                id,
                ..Self::default()
            }
        }

        pub fn bounded(id: u64, limit: usize) -> Self {
            Self {
                id,
                limit: Some(limit),
                ..Self::default()
            }
        }

        pub fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        /// Everything sent so far
        pub fn sent(&self) -> Vec<Pdu> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }

        /// Remove and return everything sent so far
        pub fn take(&self) -> Vec<Pdu> {
            std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
        }

        pub fn commands(&self) -> Vec<Command> {
            self.sent().iter().map(|p| p.cmd).collect()
        }

        pub fn len(&self) -> usize {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl Channel for MemoryChannel {
        fn id(&self) -> u64 {
            self.id
        }

        fn send(&self, pdu: &Pdu) -> Result<()> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(GdpError::new(ErrorKind::RoutingFailure, "channel closed"));
            }
            let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
            if self.limit.is_some_and(|limit| sent.len() >= limit) {
                return Err(GdpError::internal("channel full"));
            }
            sent.push(pdu.clone());
            Ok(())
        }

        fn room(&self) -> Option<usize> {
            self.limit.map(|limit| limit.saturating_sub(self.len()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryChannel;
