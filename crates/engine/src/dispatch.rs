// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch: one decoded request in, responses out on its channel

use bytes::Buf;
use gdp_core::{resolve_recno, Clock, Datum, ErrorKind, Fault, GdpError, GdpName, IoMode, Metadata, Timestamp};
use gdp_protocol::{Command, CommandClass, Pdu};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::conn::Connection;
use crate::engine::Engine;
use crate::handle::HandleRef;
use crate::log::LogState;
use crate::subscr::datum_frame;

/// A failed request: the NAK to send and why
#[derive(Debug)]
pub struct Nak {
    pub cmd: Command,
    pub error: GdpError,
}

impl Nak {
    pub fn with(cmd: Command, error: GdpError) -> Self {
        Self { cmd, error }
    }
}

impl From<GdpError> for Nak {
    fn from(error: GdpError) -> Self {
        Self {
            cmd: Command::nak_for(error.kind()),
            error,
        }
    }
}

type Handled = Result<Option<Pdu>, Nak>;

/// Subscription payload: `count i32` then an optional relative timeout
fn parse_subscription(data: &[u8]) -> Result<(u64, Option<Duration>), Nak> {
    let mut buf = data;
    if buf.remaining() < 4 {
        return Ok((0, None));
    }
    let count = buf.get_i32();
    if count < 0 {
        return Err(Nak::with(
            Command::NakBadOption,
            GdpError::bad_request(format!("negative record count {}", count)),
        ));
    }
    let timeout = if buf.remaining() >= 16 {
        let sec = buf.get_i64();
        let nsec = buf.get_u32();
        buf.advance(4);
        (sec > 0 || nsec > 0).then(|| Duration::new(sec.max(0) as u64, nsec))
    } else {
        None
    };
    ignore_trailing(Command::Subscribe, buf.remaining());
    Ok((count as u64, timeout))
}

fn ignore_trailing(cmd: Command, extra: usize) {
    if extra > 0 {
        debug!(%cmd, bytes = extra, "ignoring trailing payload");
    }
}

fn open_mode(cmd: Command) -> IoMode {
    match cmd {
        Command::OpenAo => IoMode::AppendOnly,
        Command::OpenRo => IoMode::ReadOnly,
        _ => IoMode::ReadAppend,
    }
}

impl<C: Clock> Engine<C> {
    /// Handle one request from `conn`, sending every response on its channel.
    ///
    /// Runs on a worker thread; may block on disk I/O.
    pub fn dispatch(self: &Arc<Self>, conn: &Connection, pdu: Pdu) {
        debug!(
            conn = conn.id(),
            cmd = %pdu.cmd,
            dst = %pdu.dst.short(),
            src = %pdu.src.short(),
            rid = ?pdu.rid,
            "dispatch"
        );
        let result = self.handle(conn, &pdu);
        let reply = match result {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(nak) => {
                if pdu.cmd.class() == CommandClass::Blind {
                    return;
                }
                match nak.error.kind().fault() {
                    Fault::Server => {
                        error!(cmd = %pdu.cmd, log = %pdu.dst, nak = %nak.cmd, error = %nak.error, "request failed")
                    }
                    Fault::Client | Fault::Routing => {
                        debug!(cmd = %pdu.cmd, log = %pdu.dst, nak = %nak.cmd, error = %nak.error, "request refused")
                    }
                }
                pdu.reply(nak.cmd).with_data(nak.error.message.clone())
            }
        };
        if let Err(e) = conn.channel().send(&reply) {
            debug!(conn = conn.id(), error = %e, "response dropped");
        }
    }

    fn handle(self: &Arc<Self>, conn: &Connection, pdu: &Pdu) -> Handled {
        match pdu.cmd {
            Command::Keepalive => Ok(None),
            Command::Advertise => {
                debug!(src = %pdu.src, bytes = pdu.data.len(), "peer advertisement");
                Ok(None)
            }
            Command::Hello => {
                ignore_trailing(pdu.cmd, pdu.data.len());
                Ok(Some(pdu.reply(Command::AckSuccess)))
            }
            Command::Ping => self.cmd_ping(conn, pdu),
            Command::Create => self.cmd_create(pdu),
            Command::OpenAo | Command::OpenRo | Command::OpenRa => self.cmd_open(conn, pdu),
            Command::Close => self.cmd_close(conn, pdu),
            Command::Read => self.cmd_read(conn, pdu),
            Command::Append => self.cmd_append(conn, pdu),
            Command::Subscribe => self.cmd_subscribe(conn, pdu, true),
            Command::Multiread => self.cmd_subscribe(conn, pdu, false),
            Command::GetMetadata => self.cmd_getmetadata(conn, pdu),
            Command::Unsubscribe => self.cmd_unsubscribe(conn, pdu),
            cmd if cmd.is_response() => {
                debug!(%cmd, src = %pdu.src, "ignoring unsolicited response");
                Ok(None)
            }
            cmd if cmd.class() == CommandClass::Blind => {
                debug!(%cmd, "ignoring unknown blind command");
                Ok(None)
            }
            cmd => Err(GdpError::new(
                ErrorKind::NotImplemented,
                format!("command {} not implemented", cmd),
            )
            .into()),
        }
    }

    fn is_self(&self, name: &GdpName) -> bool {
        name.is_zero() || *name == self.name()
    }

    /// The requester's lease on the log, reusing one held by an open
    fn lease(&self, conn: &Connection, pdu: &Pdu, wanted: IoMode) -> Result<HandleRef<LogState>, Nak> {
        if let Some((handle, mode)) = conn.lease(&pdu.dst, &pdu.src) {
            if !mode.allows(wanted) {
                return Err(GdpError::new(
                    ErrorKind::BadIoMode,
                    format!("log {} is open {} but needs {}", pdu.dst, mode, wanted),
                )
                .into());
            }
            return Ok(handle);
        }
        Ok(self.open_log(&pdu.dst, wanted)?)
    }

    fn cmd_ping(&self, conn: &Connection, pdu: &Pdu) -> Handled {
        ignore_trailing(pdu.cmd, pdu.data.len());
        if self.is_self(&pdu.dst) {
            return Ok(Some(pdu.reply(Command::AckSuccess)));
        }
        if self.refresh_subscriptions(conn.id(), &pdu.dst, &pdu.src) == 0 {
            return Err(Nak::with(
                Command::NakLostSubscription,
                GdpError::not_found(format!("no subscription to {}", pdu.dst)),
            ));
        }
        Ok(Some(pdu.reply(Command::AckSuccess)))
    }

    fn cmd_create(&self, pdu: &Pdu) -> Handled {
        if !self.is_self(&pdu.dst) {
            return Err(GdpError::bad_request(format!("create sent to {}, not this daemon", pdu.dst)).into());
        }
        if pdu.data.len() < gdp_core::name::NAME_LEN {
            return Err(GdpError::bad_request("create payload shorter than a name").into());
        }
        let (name, md) = pdu.data.split_at(gdp_core::name::NAME_LEN);
        let name = GdpName::from_slice(name)?;
        let metadata = Metadata::deserialize(md)?;
        let name = self.create_log(name, &metadata)?;
        let mut reply = pdu.reply(Command::AckCreated);
        reply.src = name;
        Ok(Some(reply))
    }

    fn cmd_open(&self, conn: &Connection, pdu: &Pdu) -> Handled {
        ignore_trailing(pdu.cmd, pdu.data.len());
        let mode = open_mode(pdu.cmd);
        let handle = self.open_log(&pdu.dst, mode)?;
        let state = handle.inner();
        let reply = pdu
            .reply(Command::AckSuccess)
            .with_recno(state.store().max_recno())
            .with_data(state.metadata().serialize());
        conn.hold(pdu.dst, pdu.src, handle, mode);
        Ok(Some(reply))
    }

    fn cmd_close(&self, conn: &Connection, pdu: &Pdu) -> Handled {
        ignore_trailing(pdu.cmd, pdu.data.len());
        let handle = self.lease(conn, pdu, IoMode::None)?;
        let count = handle.inner().store().max_recno();
        let ended = self.unsubscribe(conn.id(), &pdu.dst, &pdu.src);
        let held = conn.release(&pdu.dst, &pdu.src);
        debug!(log = %pdu.dst, ended, held, "closed");
        Ok(Some(pdu.reply(Command::AckSuccess).with_recno(count)))
    }

    fn cmd_read(&self, conn: &Connection, pdu: &Pdu) -> Handled {
        ignore_trailing(pdu.cmd, pdu.data.len());
        let handle = self.lease(conn, pdu, IoMode::ReadOnly)?;
        let datum = self.read(&handle, pdu.recno.unwrap_or(0))?;
        Ok(Some(datum_frame(pdu.reply(Command::AckContent), &datum)))
    }

    fn cmd_append(&self, conn: &Connection, pdu: &Pdu) -> Handled {
        let handle = self.lease(conn, pdu, IoMode::AppendOnly)?;
        let datum = Datum {
            recno: 0,
            ts: pdu.ts.unwrap_or(Timestamp::NONE),
            data: pdu.data.clone(),
            sig: pdu.sig.clone(),
        };
        let datum = self.append(&handle, datum, pdu.recno)?;
        Ok(Some(
            pdu.reply(Command::AckCreated)
                .with_recno(datum.recno)
                .with_ts(datum.ts),
        ))
    }

    fn cmd_subscribe(self: &Arc<Self>, conn: &Connection, pdu: &Pdu, live: bool) -> Handled {
        let (count, timeout) = parse_subscription(&pdu.data)?;
        let handle = self.lease(conn, pdu, IoMode::ReadOnly)?;
        let max = handle.inner().store().max_recno();
        let start = resolve_recno(pdu.recno.unwrap_or(0), max);
        if !live && start > max {
            return Err(GdpError::not_found(format!(
                "no record {} in {} (last is {})",
                start, pdu.dst, max
            ))
            .into());
        }

        let mut req = self.pool.acquire(pdu);
        req.next_recno = start;
        req.remaining = count;
        let ack = pdu.reply(Command::AckSuccess).with_recno(start);
        if let Err(e) = conn.channel().send(&ack) {
            self.pool.release(req);
            return Err(e.into());
        }
        self.subscribe(Arc::clone(conn.channel()), handle, req, timeout, live);
        Ok(None)
    }

    fn cmd_getmetadata(&self, conn: &Connection, pdu: &Pdu) -> Handled {
        ignore_trailing(pdu.cmd, pdu.data.len());
        let handle = self.lease(conn, pdu, IoMode::None)?;
        self.cache().touch(&handle);
        Ok(Some(
            pdu.reply(Command::AckContent)
                .with_data(handle.inner().metadata().serialize()),
        ))
    }

    fn cmd_unsubscribe(&self, conn: &Connection, pdu: &Pdu) -> Handled {
        ignore_trailing(pdu.cmd, pdu.data.len());
        let ended = self.unsubscribe(conn.id(), &pdu.dst, &pdu.src);
        debug!(log = %pdu.dst, ended, "unsubscribed");
        Ok(Some(pdu.reply(Command::AckDeleted)))
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
