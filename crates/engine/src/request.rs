// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request lifecycle and the pool of reusable request records

use gdp_core::{GdpName, Recno};
use gdp_protocol::{Command, Pdu};
use std::sync::Mutex;

use crate::error::TransitionError;

/// Lifecycle of a request.
///
/// `Free` records sit in the pool. `Active` means a worker is running the
/// request. `Waiting` means a response is outstanding. `Idle` is a
/// long-lived subscription between deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Free,
    Active,
    Waiting,
    Idle,
}

impl RequestState {
    pub fn can_transition(self, to: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, to),
            (Free, Active)
                | (Active, Waiting)
                | (Active, Idle)
                | (Active, Free)
                | (Waiting, Active)
                | (Waiting, Free)
                | (Idle, Active)
                | (Idle, Free)
        )
    }

    pub fn transition(&mut self, to: RequestState) -> Result<(), TransitionError> {
        if !self.can_transition(to) {
            return Err(TransitionError { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

/// One in-flight request
#[derive(Debug, Default)]
pub struct Request {
    state: RequestState,
    pub cmd: Option<Command>,
    pub rid: Option<u32>,
    pub log: GdpName,
    pub requester: GdpName,
    /// Next record to deliver for reads and subscriptions
    pub next_recno: Recno,
    /// Deliveries left; 0 is unbounded
    pub remaining: u64,
}

impl Request {
    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn transition(&mut self, to: RequestState) -> Result<(), TransitionError> {
        self.state.transition(to)
    }

    fn reset(&mut self) {
        *self = Request::default();
    }
}

/// Free list of request records
#[derive(Debug, Default)]
pub struct RequestPool {
    free: Mutex<Vec<Request>>,
}

impl RequestPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a record and make it `Active` for `pdu`
    pub fn acquire(&self, pdu: &Pdu) -> Request {
        let mut req = self
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .unwrap_or_default();
        req.state = RequestState::Active;
        req.cmd = Some(pdu.cmd);
        req.rid = pdu.rid;
        req.log = pdu.dst;
        req.requester = pdu.src;
        req
    }

    /// Return a finished record to the pool
    pub fn release(&self, mut req: Request) {
        req.reset();
        self.free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(req);
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
