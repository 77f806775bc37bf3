// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log-hosting engine: typed operations behind the command dispatcher

use gdp_core::{
    resolve_recno, Clock, Datum, ErrorKind, GdpError, GdpName, IoMode, Metadata, Recno, Result,
    Verifier,
};
use gdp_storage::LogStore;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::advertise::Advertiser;
use crate::cache::{HandleCache, Lookup};
use crate::chan::Channel;
use crate::config::EngineConfig;
use crate::conn::Connection;
use crate::error::CacheError;
use crate::handle::{Handle, HandleRef};
use crate::log::LogState;
use crate::request::{Request, RequestPool, RequestState};
use crate::subscr::{EndReason, Liveness, Registry, SubEvent, Subscription};
use gdp_protocol::Command;

/// Times an open is retried when it races with reclamation
const OPEN_ATTEMPTS: usize = 3;

/// Most records read from the store per backlog step
const BACKLOG_CHUNK: usize = 64;

/// How long a backlog waits before looking again at a full channel
const ROOM_POLL: Duration = Duration::from_millis(2);

/// A closed connection ends a subscription silently; anything else means
/// the subscriber could not keep up
fn send_failure(e: &GdpError) -> EndReason {
    match e.kind {
        ErrorKind::RoutingFailure => EndReason::ChannelClosed,
        _ => EndReason::Lost,
    }
}

/// Collaborators supplied by the host process
pub struct EngineDeps {
    pub verifier: Arc<dyn Verifier>,
    pub advertiser: Arc<dyn Advertiser>,
    /// Where subscription delivery tasks and backlog reads run
    pub runtime: tokio::runtime::Handle,
}

/// Serves logs under one storage root
pub struct Engine<C: Clock> {
    config: EngineConfig,
    clock: C,
    cache: HandleCache<LogState, C>,
    subs: Registry,
    pub(crate) pool: RequestPool,
    verifier: Arc<dyn Verifier>,
    advertiser: Arc<dyn Advertiser>,
    runtime: tokio::runtime::Handle,
}

impl<C: Clock> Engine<C> {
    pub fn new(config: EngineConfig, deps: EngineDeps, clock: C) -> Arc<Self> {
        Arc::new(Self {
            cache: HandleCache::new(clock.clone()),
            clock,
            config,
            subs: Registry::default(),
            pool: RequestPool::new(),
            verifier: deps.verifier,
            advertiser: deps.advertiser,
            runtime: deps.runtime,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The daemon's own name
    pub fn name(&self) -> GdpName {
        self.config.name
    }

    pub fn log_dir(&self) -> &Path {
        &self.config.log_dir
    }

    pub fn cache(&self) -> &HandleCache<LogState, C> {
        &self.cache
    }

    /// Advertise every log already on disk
    pub fn advertise_hosted(&self) -> Result<usize> {
        let names = LogStore::list(&self.config.log_dir)?;
        self.advertiser.advertise(&names);
        Ok(names.len())
    }

    /// Create a log; a zero name is derived from the metadata
    pub fn create_log(&self, name: GdpName, metadata: &Metadata) -> Result<GdpName> {
        // Nothing reaches disk unless the metadata is usable
        metadata.public_key()?;
        let name = if name.is_zero() {
            metadata.derive_name()
        } else {
            name
        };
        if self.cache.contains(&name) {
            return Err(GdpError::new(
                ErrorKind::AlreadyExists,
                format!("log {} already exists", name),
            ));
        }
        let store = LogStore::create(&self.config.log_dir, name, metadata, self.config.store)?;
        let handle = Handle::new(name, IoMode::ReadAppend, LogState::new(store)?);
        drop(self.cache.insert(handle)?);
        info!(log = %name, entries = metadata.len(), "created log");
        self.advertiser.advertise(&[name]);
        Ok(name)
    }

    /// Take a lease on a log, opening it if it is not cached
    pub fn open_log(&self, name: &GdpName, mode: IoMode) -> Result<HandleRef<LogState>> {
        for _ in 0..OPEN_ATTEMPTS {
            if let Lookup::Hit(handle) = self.cache.get_or_create(name, mode) {
                return Ok(handle);
            }
            let store = LogStore::open(&self.config.log_dir, *name, self.config.store)?;
            let handle = Handle::new(*name, mode, LogState::new(store)?);
                match self.cache.insert(handle) {
                Ok(handle) => {
                    debug!(log = %name, %mode, "opened log");
                    return Ok(handle);
                }
                Err(CacheError::Dropping(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(GdpError::internal(format!(
            "log {} was reclaimed during every open attempt",
            name
        )))
    }

    /// Append one record.
    ///
    /// `expected` is the recno the caller believes comes next; a mismatch
    /// is a replay or a gap. The commit timestamp comes from the engine
    /// clock. Live subscribers are notified before the append lock drops.
    pub fn append(
        &self,
        log: &HandleRef<LogState>,
        mut datum: Datum,
        expected: Option<Recno>,
    ) -> Result<Datum> {
        let state = log.inner();
        let guard = state.lock_append();
        let next = state.store().max_recno() + 1;
        if let Some(expected) = expected {
            if expected != next {
                return Err(GdpError::new(
                    ErrorKind::SequenceError,
                    format!("expected recno {} but log is at {}", expected, next),
                ));
            }
        }
        datum.recno = next;
        self.config
            .policy
            .check(self.verifier.as_ref(), state.pubkey(), &datum)?;
        datum.ts = self.clock.timestamp();
        state.store().append(&mut datum)?;

        for sub in state.subscribers() {
            sub.notify(SubEvent::Data(datum.clone()));
        }
        drop(guard);
        self.cache.touch(log);
        Ok(datum)
    }

    /// Read one record; `recno <= 0` counts back from the end
    pub fn read(&self, log: &HandleRef<LogState>, recno: Recno) -> Result<Datum> {
        let store = log.inner().store();
        let recno = resolve_recno(recno, store.max_recno());
        let datum = store.read(recno)?;
        self.cache.touch(log);
        Ok(datum)
    }

    /// Deliver records from `req.next_recno` on.
    ///
    /// A live subscription is linked before anything is read, then a
    /// delivery task sends the backlog and afterwards the live appends; a
    /// snapshot ends once the backlog is sent. Returns without touching
    /// the store.
    pub fn subscribe(
        self: &Arc<Self>,
        channel: Arc<dyn Channel>,
        log: HandleRef<LogState>,
        req: Request,
        timeout: Option<Duration>,
        live: bool,
    ) {
        let id = self.subs.next_id();
        let (sub, rx) = Subscription::new(id, log, &req, channel, self.clock.now(), timeout);
        if live {
            sub.log().link(Arc::clone(&sub));
        }
        // Snapshots are registered too, so disconnect and the keepalive
        // sweep can end a backlog stuck behind a full channel
        self.subs.insert(Arc::clone(&sub));
        debug!(
            sub = id,
            log = %sub.log_name(),
            start = req.next_recno,
            count = req.remaining,
            live,
            "subscription started"
        );
        let engine = Arc::clone(self);
        self.runtime.spawn(engine.run_subscription(sub, req, rx, live));
    }

    async fn run_subscription(
        self: Arc<Self>,
        sub: Arc<Subscription>,
        mut req: Request,
        mut rx: mpsc::UnboundedReceiver<SubEvent>,
        live: bool,
    ) {
        let mut pending = VecDeque::new();
        let reason = match self.deliver_backlog(&sub, &mut req, &mut rx, &mut pending).await {
            Some(reason) => reason,
            None if !live => EndReason::Complete,
            None => self.deliver_live(&sub, &mut req, rx, pending).await,
        };
        self.finish(&sub, req, reason);
    }

    /// Send stored records in chunks no larger than the channel has room
    /// for. Appends that arrive meanwhile are set aside in `pending`;
    /// probes and ends are handled between chunks.
    async fn deliver_backlog(
        &self,
        sub: &Arc<Subscription>,
        req: &mut Request,
        rx: &mut mpsc::UnboundedReceiver<SubEvent>,
        pending: &mut VecDeque<SubEvent>,
    ) -> Option<EndReason> {
        loop {
            while let Ok(event) = rx.try_recv() {
                match event {
                    SubEvent::End(reason) => return Some(reason),
                    SubEvent::Probe => {
                        if let Err(e) = sub.send_probe() {
                            return Some(send_failure(&e));
                        }
                    }
                    data @ SubEvent::Data(_) => pending.push_back(data),
                }
            }

            let mut limit = BACKLOG_CHUNK;
            if req.remaining > 0 {
                limit = limit.min(req.remaining.min(BACKLOG_CHUNK as u64) as usize);
            }
            if let Some(room) = sub.room() {
                if room == 0 {
                    tokio::time::sleep(ROOM_POLL).await;
                    continue;
                }
                limit = limit.min(room);
            }

            let reader = Arc::clone(sub);
            let from = req.next_recno;
            let chunk = self
                .runtime
                .spawn_blocking(move || reader.log().read_from(from, limit))
                .await;
            let chunk = match chunk {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(e)) => {
                    error!(sub = sub.id(), recno = from, error = %e, "backlog read failed");
                    return Some(EndReason::Lost);
                }
                Err(e) => {
                    error!(sub = sub.id(), recno = from, error = %e, "backlog reader failed");
                    return Some(EndReason::Lost);
                }
            };
            if chunk.is_empty() {
                return None;
            }
            for datum in &chunk {
                if let Some(reason) = self.deliver_one(sub, req, datum) {
                    return Some(reason);
                }
            }
        }
    }

    fn deliver_one(&self, sub: &Subscription, req: &mut Request, datum: &Datum) -> Option<EndReason> {
        if datum.recno < req.next_recno {
            return None;
        }
        if datum.recno > req.next_recno {
            warn!(
                sub = sub.id(),
                expected = req.next_recno,
                got = datum.recno,
                "subscription skipped records"
            );
            return Some(EndReason::Lost);
        }
        if let Err(e) = sub.send_datum(Command::AckContent, datum) {
            let reason = send_failure(&e);
            if reason == EndReason::Lost {
                warn!(sub = sub.id(), recno = datum.recno, error = %e, "subscriber fell behind");
            }
            return Some(reason);
        }
        sub.refresh(self.clock.now());
        req.next_recno += 1;
        if req.remaining > 0 {
            req.remaining -= 1;
            if req.remaining == 0 {
                return Some(EndReason::Complete);
            }
        }
        None
    }

    async fn deliver_live(
        &self,
        sub: &Subscription,
        req: &mut Request,
        mut rx: mpsc::UnboundedReceiver<SubEvent>,
        mut pending: VecDeque<SubEvent>,
    ) -> EndReason {
        loop {
            if let Err(e) = req.transition(RequestState::Idle) {
                warn!(sub = sub.id(), error = %e, "cannot park subscription");
                return EndReason::Lost;
            }
            let event = match pending.pop_front() {
                Some(event) => event,
                None => match rx.recv().await {
                    Some(event) => event,
                    None => return EndReason::Lost,
                },
            };
            if let Err(e) = req.transition(RequestState::Active) {
                warn!(sub = sub.id(), error = %e, "subscription woke in bad state");
                return EndReason::Lost;
            }
            let outcome = match event {
                SubEvent::Data(datum) => self.deliver_one(sub, req, &datum),
                SubEvent::Probe => sub.send_probe().err().map(|e| send_failure(&e)),
                SubEvent::End(reason) => Some(reason),
            };
            if let Some(reason) = outcome {
                return reason;
            }
        }
    }

    fn finish(&self, sub: &Subscription, mut req: Request, reason: EndReason) {
        sub.log().unlink(sub);
        self.subs.remove(sub.id());
        if let Err(e) = sub.send_end(reason, req.next_recno) {
            debug!(sub = sub.id(), error = %e, "could not send end of subscription");
        }
        if let Err(e) = req.transition(RequestState::Free) {
            warn!(sub = sub.id(), error = %e, "subscription ended in bad state");
        }
        self.pool.release(req);
        debug!(sub = sub.id(), log = %sub.log_name(), ?reason, "subscription ended");
    }

    fn end_matching(&self, reason: EndReason, pred: impl Fn(&Subscription) -> bool) -> usize {
        let subs = self.subs.matching(pred);
        for sub in &subs {
            sub.notify(SubEvent::End(reason));
        }
        subs.len()
    }

    /// End `subscriber`'s subscriptions to `log` on one connection
    pub fn unsubscribe(&self, conn_id: u64, log: &GdpName, subscriber: &GdpName) -> usize {
        self.end_matching(EndReason::Unsubscribed, |s| {
            s.conn_id() == conn_id && s.log_name() == *log && s.subscriber() == *subscriber
        })
    }

    /// Note that `subscriber` is still listening; returns how many matched
    pub fn refresh_subscriptions(&self, conn_id: u64, log: &GdpName, subscriber: &GdpName) -> usize {
        let now = self.clock.now();
        let subs = self.subs.matching(|s| {
            s.conn_id() == conn_id && s.log_name() == *log && s.subscriber() == *subscriber
        });
        for sub in &subs {
            sub.refresh(now);
        }
        subs.len()
    }

    /// Probe quiet subscriptions and end dead or expired ones
    pub fn sweep_subscriptions(&self) -> usize {
        let now = self.clock.now();
        let poke = self.config.subscr.poke_interval;
        let dead = self.config.subscr.dead_interval;
        let mut acted = 0;
        for sub in self.subs.all() {
            match sub.check_liveness(now, poke, dead) {
                Liveness::Fine => continue,
                Liveness::Probe => {
                    debug!(sub = sub.id(), log = %sub.log_name(), "probing quiet subscriber");
                    sub.notify(SubEvent::Probe);
                }
                Liveness::End(reason) => {
                    info!(sub = sub.id(), log = %sub.log_name(), ?reason, "dropping subscription");
                    sub.notify(SubEvent::End(reason));
                }
            }
            acted += 1;
        }
        acted
    }

    /// Close logs nobody has used for the configured idle age
    pub fn reclaim(&self) -> Vec<GdpName> {
        self.cache.reclaim(self.config.reclaim.age)
    }

    /// Forget a connection: its subscriptions end and its leases drop
    pub fn disconnect(&self, conn: &Connection) {
        let subs = self.end_matching(EndReason::ChannelClosed, |s| s.conn_id() == conn.id());
        let leases = conn.release_all();
        debug!(conn = conn.id(), subs, leases, "connection released");
    }

    /// End every subscription and empty the cache
    pub fn shutdown(&self) {
        let subs = self.end_matching(EndReason::Shutdown, |_| true);
        let logs = self.cache.drain();
        info!(subs, logs = logs.len(), "engine shut down");
    }

    pub fn subscription_count(&self) -> usize {
        self.subs.len()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
