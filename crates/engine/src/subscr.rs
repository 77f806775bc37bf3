// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriptions: backlog delivery, live fan-out and keepalive
//!
//! A subscription is linked onto its log before the backlog is read. Every
//! append after that point is queued to the subscription's channel, and
//! its delivery task drops anything below the next expected recno, so the
//! stream has neither gaps nor duplicates.
//!
//! The backlog is paced by the room left on the connection. Live appends
//! cannot wait, so a subscriber whose queue is full when one arrives is
//! dropped as lost.
//!
//! Only the delivery task touches the [`Request`]; other threads talk to
//! it through [`SubEvent`]s.

use gdp_core::{Datum, GdpName, Recno};
use gdp_protocol::{Command, Pdu};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::chan::Channel;
use crate::handle::HandleRef;
use crate::log::LogState;
use crate::request::Request;

/// Why a subscription ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Requested count delivered, or a snapshot read finished
    Complete,
    Unsubscribed,
    /// The subscription's own timeout passed
    Expired,
    /// Keepalive gave up, or delivery broke
    Lost,
    /// The connection is gone; nothing more can be sent
    ChannelClosed,
    Shutdown,
}

impl EndReason {
    /// Final frame sent to the subscriber, if any
    pub fn final_command(self) -> Option<Command> {
        match self {
            EndReason::Complete | EndReason::Unsubscribed | EndReason::Expired => {
                Some(Command::AckDeleted)
            }
            EndReason::Lost | EndReason::Shutdown => Some(Command::NakLostSubscription),
            EndReason::ChannelClosed => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum SubEvent {
    Data(Datum),
    Probe,
    End(EndReason),
}

/// What the keepalive sweep decided for one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Fine,
    Probe,
    End(EndReason),
}

struct Activity {
    last: Instant,
    probed: bool,
    expires: Option<Instant>,
}

pub struct Subscription {
    id: u64,
    log: HandleRef<LogState>,
    log_name: GdpName,
    subscriber: GdpName,
    rid: Option<u32>,
    channel: Arc<dyn Channel>,
    tx: mpsc::UnboundedSender<SubEvent>,
    activity: Mutex<Activity>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        log: HandleRef<LogState>,
        req: &Request,
        channel: Arc<dyn Channel>,
        now: Instant,
        timeout: Option<Duration>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SubEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log_name = log.name();
        let sub = Arc::new(Self {
            id,
            log,
            log_name,
            subscriber: req.requester,
            rid: req.rid,
            channel,
            tx,
            activity: Mutex::new(Activity {
                last: now,
                probed: false,
                expires: timeout.map(|t| now + t),
            }),
        });
        (sub, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn log_name(&self) -> GdpName {
        self.log_name
    }

    pub fn subscriber(&self) -> GdpName {
        self.subscriber
    }

    pub fn conn_id(&self) -> u64 {
        self.channel.id()
    }

    pub(crate) fn log(&self) -> &LogState {
        self.log.inner()
    }

    /// Room left in the subscriber's outbound queue
    pub(crate) fn room(&self) -> Option<usize> {
        self.channel.room()
    }

    fn lock_activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an event for the delivery task; false if it has finished
    pub(crate) fn notify(&self, event: SubEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub(crate) fn refresh(&self, now: Instant) {
        let mut activity = self.lock_activity();
        activity.last = now;
        activity.probed = false;
    }

    pub(crate) fn check_liveness(&self, now: Instant, poke: Duration, dead: Duration) -> Liveness {
        let mut activity = self.lock_activity();
        if activity.expires.is_some_and(|at| now >= at) {
            return Liveness::End(EndReason::Expired);
        }
        let idle = now.saturating_duration_since(activity.last);
        if idle >= dead {
            return Liveness::End(EndReason::Lost);
        }
        if idle >= poke && !activity.probed {
            activity.probed = true;
            return Liveness::Probe;
        }
        Liveness::Fine
    }

    fn frame(&self, cmd: Command) -> Pdu {
        let mut pdu = Pdu::new(cmd, self.subscriber, self.log_name);
        pdu.rid = self.rid;
        pdu
    }

    /// Send one record to the subscriber
    pub(crate) fn send_datum(&self, cmd: Command, datum: &Datum) -> gdp_core::Result<()> {
        self.channel.send(&datum_frame(self.frame(cmd), datum))
    }

    pub(crate) fn send_probe(&self) -> gdp_core::Result<()> {
        self.channel.send(&self.frame(Command::Keepalive))
    }

    pub(crate) fn send_end(&self, reason: EndReason, next_recno: Recno) -> gdp_core::Result<()> {
        match reason.final_command() {
            Some(cmd) => self.channel.send(&self.frame(cmd).with_recno(next_recno)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("log", &self.log_name)
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

/// Fill a response frame with a record's fields
pub fn datum_frame(pdu: Pdu, datum: &Datum) -> Pdu {
    pdu.with_recno(datum.recno)
        .with_ts(datum.ts)
        .with_data(datum.data.clone())
        .with_sig(datum.sig.clone())
}

/// Every live subscription, by id
#[derive(Default)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    subs: Mutex<HashMap<u64, Arc<Subscription>>>,
}

impl Registry {
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<Subscription>>> {
        self.subs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn insert(&self, sub: Arc<Subscription>) {
        self.lock().insert(sub.id, sub);
    }

    pub(crate) fn remove(&self, id: u64) {
        self.lock().remove(&id);
    }

    pub(crate) fn all(&self) -> Vec<Arc<Subscription>> {
        self.lock().values().cloned().collect()
    }

    pub(crate) fn matching(&self, pred: impl Fn(&Subscription) -> bool) -> Vec<Arc<Subscription>> {
        self.lock().values().filter(|s| pred(s)).cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}
