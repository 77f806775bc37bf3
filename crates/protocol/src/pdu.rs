// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PDU framing
//!
//! ```text
//! +-----+-----+------+-----+----------+----------+--------+--------+-------+-------+------+
//! | ver | ttl | rsvd | cmd | dst (32) | src (32) | sigalg | siglen | olen  | flags | dlen |
//! +-----+-----+------+-----+----------+----------+--------+--------+-------+-------+------+
//! | options (olen * 4) | data (dlen) | signature (siglen * 4)                              |
//! +--------------------------------------------------------------------------------------+
//! ```
//!
//! All integers are big-endian. Decoding is incremental: a short buffer
//! yields `Ok(None)` and leaves the buffer untouched.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use gdp_core::datum::Signature;
use gdp_core::{ErrorKind, GdpError, GdpName, Recno, Timestamp};
use thiserror::Error;

use crate::command::Command;

pub const PROTO_VERSION: u8 = 3;
pub const PROTO_MIN_VERSION: u8 = 3;
pub const PROTO_MAX_VERSION: u8 = 3;
pub const DEFAULT_TTL: u8 = 15;
pub const DEFAULT_PORT: u16 = 8007;

/// Length of the fixed header
pub const HEADER_LEN: usize = 76;

/// Largest signature the header can describe (255 words)
pub const MAX_SIG_BYTES: usize = 255 * 4;

/// Largest payload accepted from a peer
pub const MAX_DATA_LEN: usize = 64 * 1024 * 1024;

pub mod flags {
    pub const RID: u8 = 0x01;
    pub const RECNO: u8 = 0x02;
    pub const SEQNO: u8 = 0x04;
    pub const TS: u8 = 0x08;
}

const RID_LEN: usize = 4;
const RECNO_LEN: usize = 8;
const SEQNO_LEN: usize = 8;
const TS_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unsupported protocol version {0}")]
    BadVersion(u8),
    #[error("option block of {have} bytes, flags need {need}")]
    OptionsTooShort { need: usize, have: usize },
    #[error("payload of {0} bytes exceeds limit")]
    TooLarge(usize),
    #[error("signature of {0} bytes exceeds limit")]
    SignatureTooLarge(usize),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timeout")]
    Timeout,
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e.to_string())
    }
}

impl From<ProtocolError> for GdpError {
    fn from(e: ProtocolError) -> Self {
        let kind = match e {
            ProtocolError::Timeout => ErrorKind::Timeout,
            ProtocolError::ConnectionClosed | ProtocolError::Io(_) => ErrorKind::RoutingFailure,
            _ => ErrorKind::BadRequest,
        };
        GdpError::new(kind, e.to_string())
    }
}

/// One decoded protocol frame
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub ver: u8,
    pub ttl: u8,
    pub cmd: Command,
    pub dst: GdpName,
    pub src: GdpName,
    pub rid: Option<u32>,
    pub recno: Option<Recno>,
    pub seqno: Option<u64>,
    pub ts: Option<Timestamp>,
    pub data: Bytes,
    pub sig: Option<Signature>,
}

impl Pdu {
    pub fn new(cmd: Command, dst: GdpName, src: GdpName) -> Self {
        Self {
            ver: PROTO_VERSION,
            ttl: DEFAULT_TTL,
            cmd,
            dst,
            src,
            rid: None,
            recno: None,
            seqno: None,
            ts: None,
            data: Bytes::new(),
            sig: None,
        }
    }

    pub fn with_rid(mut self, rid: u32) -> Self {
        self.rid = Some(rid);
        self
    }

    pub fn with_recno(mut self, recno: Recno) -> Self {
        self.recno = Some(recno);
        self
    }

    pub fn with_ts(mut self, ts: Timestamp) -> Self {
        self.ts = Some(ts);
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_sig(mut self, sig: Option<Signature>) -> Self {
        self.sig = sig;
        self
    }

    /// Build a response to this request: addresses swapped, rid copied
    pub fn reply(&self, cmd: Command) -> Pdu {
        let mut pdu = Pdu::new(cmd, self.src, self.dst);
        pdu.rid = self.rid;
        pdu
    }

    fn flags(&self) -> u8 {
        let mut f = 0;
        if self.rid.is_some() {
            f |= flags::RID;
        }
        if self.recno.is_some() {
            f |= flags::RECNO;
        }
        if self.seqno.is_some() {
            f |= flags::SEQNO;
        }
        if self.ts.is_some() {
            f |= flags::TS;
        }
        f
    }

    /// Total encoded size
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + options_len(self.flags()) + self.data.len() + padded_sig_len(self.sig.as_ref())
    }
}

fn options_len(f: u8) -> usize {
    let mut len = 0;
    if f & flags::RID != 0 {
        len += RID_LEN;
    }
    if f & flags::RECNO != 0 {
        len += RECNO_LEN;
    }
    if f & flags::SEQNO != 0 {
        len += SEQNO_LEN;
    }
    if f & flags::TS != 0 {
        len += TS_LEN;
    }
    len
}

fn padded_sig_len(sig: Option<&Signature>) -> usize {
    sig.map(|s| s.bytes.len().div_ceil(4) * 4).unwrap_or(0)
}

/// Encode a frame into one contiguous buffer
pub fn encode(pdu: &Pdu) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(pdu.encoded_len());
    encode_into(pdu, &mut buf)?;
    Ok(buf.freeze())
}

pub fn encode_into(pdu: &Pdu, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    if pdu.data.len() > MAX_DATA_LEN {
        return Err(ProtocolError::TooLarge(pdu.data.len()));
    }
    let sig_len = padded_sig_len(pdu.sig.as_ref());
    if sig_len > MAX_SIG_BYTES {
        return Err(ProtocolError::SignatureTooLarge(sig_len));
    }
    let f = pdu.flags();
    let olen = options_len(f);

    buf.reserve(HEADER_LEN + olen + pdu.data.len() + sig_len);
    buf.put_u8(pdu.ver);
    buf.put_u8(pdu.ttl);
    buf.put_u8(0);
    buf.put_u8(pdu.cmd.code());
    buf.put_slice(pdu.dst.as_bytes());
    buf.put_slice(pdu.src.as_bytes());
    buf.put_u8(pdu.sig.as_ref().map(|s| s.md_alg).unwrap_or(0));
    buf.put_u8((sig_len / 4) as u8);
    buf.put_u8((olen / 4) as u8);
    buf.put_u8(f);
    buf.put_u32(pdu.data.len() as u32);

    if let Some(rid) = pdu.rid {
        buf.put_u32(rid);
    }
    if let Some(recno) = pdu.recno {
        buf.put_i64(recno);
    }
    if let Some(seqno) = pdu.seqno {
        buf.put_u64(seqno);
    }
    if let Some(ts) = pdu.ts {
        buf.put_i64(ts.sec);
        buf.put_u32(ts.nsec);
        buf.put_u32(ts.accuracy.to_bits());
    }

    buf.put_slice(&pdu.data);
    if let Some(sig) = &pdu.sig {
        buf.put_slice(&sig.bytes);
        buf.put_bytes(0, sig_len - sig.bytes.len());
    }
    Ok(())
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when more input is needed; the buffer is consumed only
/// when a whole frame is returned.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Pdu>, ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Ok(None);
    }
    let ver = buf[0];
    if !(PROTO_MIN_VERSION..=PROTO_MAX_VERSION).contains(&ver) {
        return Err(ProtocolError::BadVersion(ver));
    }
    let sig_len = buf[69] as usize * 4;
    let olen = buf[70] as usize * 4;
    let f = buf[71];
    let dlen = u32::from_be_bytes([buf[72], buf[73], buf[74], buf[75]]) as usize;

    let need = options_len(f);
    if olen < need {
        return Err(ProtocolError::OptionsTooShort { need, have: olen });
    }
    if dlen > MAX_DATA_LEN {
        return Err(ProtocolError::TooLarge(dlen));
    }
    let total = HEADER_LEN + olen + dlen + sig_len;
    if buf.len() < total {
        buf.reserve(total - buf.len());
        return Ok(None);
    }

    let mut frame = buf.split_to(total).freeze();
    let ver = frame.get_u8();
    let ttl = frame.get_u8();
    frame.advance(1);
    let cmd = Command::from_code(frame.get_u8());
    let dst = read_name(&mut frame);
    let src = read_name(&mut frame);
    let sigalg = frame.get_u8();
    frame.advance(3);
    frame.advance(4);

    let mut opts = frame.split_to(olen);
    let rid = (f & flags::RID != 0).then(|| opts.get_u32());
    let recno = (f & flags::RECNO != 0).then(|| opts.get_i64());
    let seqno = (f & flags::SEQNO != 0).then(|| opts.get_u64());
    let ts = (f & flags::TS != 0).then(|| Timestamp {
        sec: opts.get_i64(),
        nsec: opts.get_u32(),
        accuracy: f32::from_bits(opts.get_u32()),
    });
    // anything left in `opts` is an option this version does not know

    let data = frame.split_to(dlen);
    let sig = if sig_len > 0 || sigalg != 0 {
        Some(Signature {
            md_alg: sigalg,
            bytes: frame.split_to(sig_len),
        })
    } else {
        None
    };

    Ok(Some(Pdu {
        ver,
        ttl,
        cmd,
        dst,
        src,
        rid,
        recno,
        seqno,
        ts,
        data,
        sig,
    }))
}

fn read_name(buf: &mut Bytes) -> GdpName {
    let mut raw = [0u8; 32];
    buf.copy_to_slice(&mut raw);
    GdpName::new(raw)
}

#[cfg(test)]
#[path = "pdu_tests.rs"]
mod tests;
