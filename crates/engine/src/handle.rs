// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared, reference-counted handles to open logs

use gdp_core::{GdpName, IoMode};
use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

pub(crate) struct HandleState {
    pub(crate) iomode: IoMode,
    pub(crate) refcnt: usize,
    /// Being removed from the cache; never re-inserted
    pub(crate) dropping: bool,
    pub(crate) last_used: Instant,
    /// Position in the cache's LRU order
    pub(crate) lru_tick: u64,
}

/// In-memory representative of one open log
pub struct Handle<T> {
    name: RwLock<GdpName>,
    pub(crate) state: Mutex<HandleState>,
    inner: T,
}

impl<T> Handle<T> {
    pub fn new(name: GdpName, iomode: IoMode, inner: T) -> Arc<Self> {
        Arc::new(Self {
            name: RwLock::new(name),
            state: Mutex::new(HandleState {
                iomode,
                refcnt: 0,
                dropping: false,
                last_used: Instant::now(),
                lru_tick: 0,
            }),
            inner,
        })
    }

    pub fn name(&self) -> GdpName {
        *self.name.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set_name(&self, name: GdpName) {
        *self.name.write().unwrap_or_else(|e| e.into_inner()) = name;
    }

    pub(crate) fn lock_state(&self) -> std::sync::MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn iomode(&self) -> IoMode {
        self.lock_state().iomode
    }

    pub fn refcnt(&self) -> usize {
        self.lock_state().refcnt
    }

    pub fn is_dropping(&self) -> bool {
        self.lock_state().dropping
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

/// A counted lease on a handle; dropping it releases the reference
pub struct HandleRef<T> {
    handle: Arc<Handle<T>>,
}

impl<T> HandleRef<T> {
    /// Caller has already incremented the count
    pub(crate) fn adopt(handle: Arc<Handle<T>>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Arc<Handle<T>> {
        &self.handle
    }

    /// Whether two leases refer to the same handle
    pub fn same(&self, other: &HandleRef<T>) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl<T> Clone for HandleRef<T> {
    fn clone(&self) -> Self {
        self.handle.lock_state().refcnt += 1;
        Self {
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<T> Deref for HandleRef<T> {
    type Target = Handle<T>;

    fn deref(&self) -> &Handle<T> {
        &self.handle
    }
}

impl<T> Drop for HandleRef<T> {
    fn drop(&mut self) {
        let mut state = self.handle.lock_state();
        state.refcnt = state.refcnt.saturating_sub(1);
    }
}

impl<T> std::fmt::Debug for HandleRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRef")
            .field("name", &self.handle.name())
            .finish_non_exhaustive()
    }
}
