// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-side state of one open log

use gdp_core::{Datum, GdpError, Metadata, PublicKey, Recno, Result};
use gdp_storage::{LogStore, StoreError};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::subscr::Subscription;

/// What a cached handle holds for a log: its store plus everyone
/// subscribed to it
pub struct LogState {
    store: LogStore,
    metadata: Metadata,
    pubkey: Option<PublicKey>,
    /// Held across append and fan-out so subscribers see recno order
    append_lock: Mutex<()>,
    subscribers: Mutex<Vec<Arc<Subscription>>>,
}

impl LogState {
    pub fn new(store: LogStore) -> Result<Self> {
        let metadata = store.metadata().map_err(GdpError::from)?;
        let pubkey = metadata.public_key()?;
        Ok(Self {
            store,
            metadata,
            pubkey,
            append_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn pubkey(&self) -> Option<&PublicKey> {
        self.pubkey.as_ref()
    }

    /// Up to `limit` records from `from` on, stopping at the end of the log
    pub fn read_from(&self, from: Recno, limit: usize) -> std::result::Result<Vec<Datum>, StoreError> {
        let last = self.store.max_recno();
        let mut records = Vec::new();
        let mut recno = from;
        while recno <= last && records.len() < limit {
            records.push(self.store.read(recno)?);
            recno += 1;
        }
        Ok(records)
    }

    pub(crate) fn lock_append(&self) -> MutexGuard<'_, ()> {
        self.append_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<Arc<Subscription>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn link(&self, sub: Arc<Subscription>) {
        self.lock_subscribers().push(sub);
    }

    pub(crate) fn unlink(&self, sub: &Subscription) {
        self.lock_subscribers()
            .retain(|s| !std::ptr::eq(Arc::as_ptr(s), sub));
    }

    pub(crate) fn subscribers(&self) -> Vec<Arc<Subscription>> {
        self.lock_subscribers().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }
}

impl std::fmt::Debug for LogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogState")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
