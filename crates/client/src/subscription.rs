// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription streams

use gdp_core::{Datum, GdpError, GdpName, Recno, Timestamp};
use gdp_protocol::{Command, Pdu};
use tokio::sync::mpsc;

/// Something that happened to a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Data(Datum),
    /// The daemon finished the subscription normally
    EndOfSubscription { next_recno: Option<Recno> },
    /// The subscription was lost; no more events follow
    Shutdown(GdpError),
}

impl SubscriptionEvent {
    /// Whether no more events can follow this one
    pub fn is_final(&self) -> bool {
        !matches!(self, SubscriptionEvent::Data(_))
    }

    /// Interpret a frame that arrived on a subscription's request id
    pub(crate) fn from_pdu(pdu: Pdu) -> Option<Self> {
        match pdu.cmd {
            Command::AckContent => Some(SubscriptionEvent::Data(Datum {
                recno: pdu.recno.unwrap_or(0),
                ts: pdu.ts.unwrap_or(Timestamp::NONE),
                data: pdu.data,
                sig: pdu.sig,
            })),
            Command::AckDeleted => Some(SubscriptionEvent::EndOfSubscription {
                next_recno: pdu.recno,
            }),
            cmd => cmd.error_kind().map(|kind| {
                SubscriptionEvent::Shutdown(GdpError::new(
                    kind,
                    format!("{} from {}", cmd, pdu.src),
                ))
            }),
        }
    }
}

/// Stream of events for one subscription or multiread
#[derive(Debug)]
pub struct Subscription {
    rid: u32,
    log: GdpName,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl Subscription {
    pub(crate) fn new(
        rid: u32,
        log: GdpName,
        events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    ) -> Self {
        Self { rid, log, events }
    }

    pub fn rid(&self) -> u32 {
        self.rid
    }

    pub fn log(&self) -> GdpName {
        self.log
    }

    /// Next event; `None` once the final event has been taken
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    /// Collect records until the subscription ends
    pub async fn collect_data(&mut self) -> (Vec<Datum>, Option<SubscriptionEvent>) {
        let mut data = Vec::new();
        while let Some(event) = self.next().await {
            match event {
                SubscriptionEvent::Data(d) => data.push(d),
                end => return (data, Some(end)),
            }
        }
        (data, None)
    }
}
