// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side view of an open log

use gdp_core::{GdpName, IoMode, Metadata, Recno, Signer};
use gdp_engine::HandleRef;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// What the client knows about one log, shared by every lease on it
pub struct LogInfo {
    metadata: Metadata,
    /// Highest record number this client has seen
    count: AtomicI64,
    signer: Mutex<Option<Arc<dyn Signer>>>,
}

impl LogInfo {
    pub fn new(metadata: Metadata, count: Recno) -> Self {
        Self {
            metadata,
            count: AtomicI64::new(count),
            signer: Mutex::new(None),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn count(&self) -> Recno {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn observe(&self, recno: Recno) {
        self.count.fetch_max(recno, Ordering::AcqRel);
    }

    pub fn signer(&self) -> Option<Arc<dyn Signer>> {
        self.signer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_signer(&self, signer: Arc<dyn Signer>) {
        *self.signer.lock().unwrap_or_else(|e| e.into_inner()) = Some(signer);
    }
}

/// A lease on an open log. Clones share the handle.
#[derive(Clone)]
pub struct Log {
    lease: HandleRef<LogInfo>,
}

impl Log {
    pub(crate) fn new(lease: HandleRef<LogInfo>) -> Self {
        Self { lease }
    }

    pub fn name(&self) -> GdpName {
        self.lease.name()
    }

    /// Widest mode any opener of this log asked for
    pub fn iomode(&self) -> IoMode {
        self.lease.iomode()
    }

    pub fn metadata(&self) -> &Metadata {
        self.lease.inner().metadata()
    }

    /// Records known to exist, as of the last reply that said so
    pub fn count(&self) -> Recno {
        self.lease.inner().count()
    }

    /// Sign future appends through this handle
    pub fn set_signer(&self, signer: Arc<dyn Signer>) {
        self.lease.inner().set_signer(signer);
    }

    pub(crate) fn info(&self) -> &LogInfo {
        self.lease.inner()
    }

    pub(crate) fn lease(&self) -> &HandleRef<LogInfo> {
        &self.lease
    }

    pub(crate) fn into_lease(self) -> HandleRef<LogInfo> {
        self.lease
    }

    /// Whether this is the only outstanding lease on the handle
    pub(crate) fn is_last(&self) -> bool {
        self.lease.refcnt() <= 1
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("name", &self.name())
            .field("iomode", &self.iomode())
            .field("count", &self.count())
            .finish()
    }
}
