// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name-keyed cache of open log handles with LRU reclamation
//!
//! One mutex guards the name map and the LRU order together so they can
//! never disagree. A handle's own mutex guards its count and flags; the
//! cache lock is always taken first. No file I/O happens under either:
//! evicted handles are dropped after the cache lock is released.

use gdp_core::{Clock, GdpName, IoMode};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::error::CacheError;
use crate::handle::{Handle, HandleRef};

struct CacheInner<T> {
    by_name: HashMap<GdpName, Arc<Handle<T>>>,
    /// Oldest-touched first
    lru: BTreeMap<u64, GdpName>,
    tick: u64,
}

impl<T> CacheInner<T> {
    fn bump(&mut self, name: GdpName, old_tick: u64) -> u64 {
        self.lru.remove(&old_tick);
        self.tick += 1;
        self.lru.insert(self.tick, name);
        self.tick
    }
}

/// Result of a cache lookup
pub enum Lookup<T> {
    Hit(HandleRef<T>),
    /// Caller opens the log (outside any lock) and calls [`HandleCache::insert`]
    Miss,
}

pub struct HandleCache<T, C: Clock> {
    inner: Mutex<CacheInner<T>>,
    clock: C,
}

impl<T, C: Clock> HandleCache<T, C> {
    pub fn new(clock: C) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                by_name: HashMap::new(),
                lru: BTreeMap::new(),
                tick: 0,
            }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Find a cached handle, taking a reference and widening its mode.
    pub fn get_or_create(&self, name: &GdpName, mode: IoMode) -> Lookup<T> {
        let mut inner = self.lock();
        let Some(handle) = inner.by_name.get(name).cloned() else {
            return Lookup::Miss;
        };
        let mut state = handle.lock_state();
        if state.dropping {
            return Lookup::Miss;
        }
        state.refcnt += 1;
        state.iomode = state.iomode.union(mode);
        state.last_used = self.clock.now();
        state.lru_tick = inner.bump(*name, state.lru_tick);
        drop(state);
        Lookup::Hit(HandleRef::adopt(handle))
    }

    /// Cached handle without changing its mode
    pub fn get(&self, name: &GdpName) -> Option<HandleRef<T>> {
        match self.get_or_create(name, IoMode::None) {
            Lookup::Hit(h) => Some(h),
            Lookup::Miss => None,
        }
    }

    /// Add a newly opened handle and take a reference to it.
    ///
    /// If another caller inserted the same name first, that handle wins and
    /// `handle` is discarded.
    pub fn insert(&self, handle: Arc<Handle<T>>) -> Result<HandleRef<T>, CacheError> {
        let name = handle.name();
        let mut inner = self.lock();
        if let Some(existing) = inner.by_name.get(&name).cloned() {
            let mut state = existing.lock_state();
            if !state.dropping {
                state.refcnt += 1;
                state.iomode = state.iomode.union(handle.iomode());
                state.last_used = self.clock.now();
                state.lru_tick = inner.bump(name, state.lru_tick);
                drop(state);
                debug!(log = %name, "lost insert race, using cached handle");
                return Ok(HandleRef::adopt(existing));
            }
        }

        let mut state = handle.lock_state();
        if state.dropping {
            return Err(CacheError::Dropping(name));
        }
        state.refcnt += 1;
        state.last_used = self.clock.now();
        inner.tick += 1;
        state.lru_tick = inner.tick;
        let tick = inner.tick;
        inner.lru.insert(tick, name);
        drop(state);
        inner.by_name.insert(name, Arc::clone(&handle));
        Ok(HandleRef::adopt(handle))
    }

    /// Mark a handle as just used
    pub fn touch(&self, handle: &Handle<T>) {
        let mut inner = self.lock();
        let name = handle.name();
        let mut state = handle.lock_state();
        if state.dropping || !inner.by_name.contains_key(&name) {
            return;
        }
        state.last_used = self.clock.now();
        state.lru_tick = inner.bump(name, state.lru_tick);
    }

    /// Give back a reference. Equivalent to dropping the lease.
    pub fn release(&self, handle: HandleRef<T>) {
        drop(handle);
    }

    /// Evict unreferenced handles idle for at least `max_idle`.
    ///
    /// Releasing the last lease never frees a handle; it stays cached until
    /// a sweep finds it old enough, so a log created by one request is
    /// still open when the creator's next request arrives. Returns the
    /// evicted names, oldest first.
    pub fn reclaim(&self, max_idle: Duration) -> Vec<GdpName> {
        let now = self.clock.now();
        let mut evicted = Vec::new();
        let mut names = Vec::new();
        {
            let mut inner = self.lock();
            let candidates: Vec<(u64, GdpName)> =
                inner.lru.iter().map(|(t, n)| (*t, *n)).collect();
            for (tick, name) in candidates {
                let Some(handle) = inner.by_name.get(&name).cloned() else {
                    continue;
                };
                let mut state = handle.lock_state();
                let idle = now.saturating_duration_since(state.last_used);
                if state.refcnt > 0 || idle < max_idle {
                    continue;
                }
                state.dropping = true;
                drop(state);
                inner.lru.remove(&tick);
                inner.by_name.remove(&name);
                names.push(name);
                evicted.push(handle);
            }
        }
        if !names.is_empty() {
            debug!(count = names.len(), "reclaimed idle handles");
        }
        // Closing files happens here, with the cache unlocked
        drop(evicted);
        names
    }

    /// Move a handle to a new name; its references are untouched.
    pub fn rename(&self, handle: &Handle<T>, new_name: GdpName) -> Result<(), CacheError> {
        let mut inner = self.lock();
        let old_name = handle.name();
        if old_name == new_name {
            return Ok(());
        }
        if inner.by_name.contains_key(&new_name) {
            return Err(CacheError::Exists(new_name));
        }
        let Some(cached) = inner.by_name.get(&old_name).cloned() else {
            return Err(CacheError::NotCached(old_name));
        };
        if !std::ptr::eq(Arc::as_ptr(&cached), handle) {
            return Err(CacheError::NotCached(old_name));
        }
        let tick = handle.lock_state().lru_tick;
        inner.by_name.remove(&old_name);
        handle.set_name(new_name);
        inner.by_name.insert(new_name, cached);
        inner.lru.insert(tick, new_name);
        debug!(from = %old_name, to = %new_name, "renamed cached handle");
        Ok(())
    }

    /// Evict everything regardless of references (shutdown)
    pub fn drain(&self) -> Vec<GdpName> {
        let drained: Vec<Arc<Handle<T>>> = {
            let mut inner = self.lock();
            inner.lru.clear();
            inner.by_name.drain().map(|(_, h)| h).collect()
        };
        for handle in &drained {
            handle.lock_state().dropping = true;
        }
        drained.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &GdpName) -> bool {
        self.lock().by_name.contains_key(name)
    }

    /// Names in LRU order, oldest first
    pub fn lru_names(&self) -> Vec<GdpName> {
        self.lock().lru.values().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn check_consistent(&self) {
        let inner = self.lock();
        assert_eq!(inner.by_name.len(), inner.lru.len());
        for (tick, name) in &inner.lru {
            let handle = inner.by_name.get(name).expect("lru entry missing from map");
            assert_eq!(handle.lock_state().lru_tick, *tick);
            assert_eq!(handle.name(), *name);
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
