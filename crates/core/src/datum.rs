// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records and their commit timestamps

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::{GdpError, Result};

/// 1-based record number; zero and negatives are relative-to-end sentinels
pub type Recno = i64;

/// No record number assigned yet
pub const RECNO_NONE: Recno = 0;

/// Resolve a caller-supplied record number against the log's current length.
///
/// Positive values are absolute. `0` means "the next record to be written"
/// and `-k` means "the k-th most recent record". The result is clamped to 1.
pub fn resolve_recno(requested: Recno, count: Recno) -> Recno {
    if requested > 0 {
        requested
    } else {
        (count + 1 + requested).max(1)
    }
}

/// Commit timestamp with an accuracy estimate in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
    pub accuracy: f32,
}

impl Timestamp {
    /// Sentinel "no timestamp" value
    pub const NONE: Timestamp = Timestamp {
        sec: i64::MIN,
        nsec: 0,
        accuracy: 0.0,
    };

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            sec: dt.timestamp(),
            nsec: dt.timestamp_subsec_nanos(),
            accuracy: 0.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.sec != i64::MIN && self.nsec < 1_000_000_000
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.is_valid() {
            return None;
        }
        DateTime::from_timestamp(self.sec, self.nsec)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => f.write_str("(none)"),
        }
    }
}

/// Largest signature the record header can describe
pub const MAX_SIG_LEN: usize = 0xfff;

/// Signature over a record, tagged with the digest algorithm used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub md_alg: u8,
    pub bytes: Bytes,
}

impl Signature {
    pub fn new(md_alg: u8, bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() > MAX_SIG_LEN {
            return Err(GdpError::bad_request(format!(
                "signature of {} bytes exceeds {}",
                bytes.len(),
                MAX_SIG_LEN
            )));
        }
        if md_alg > 0xf {
            return Err(GdpError::bad_request("digest algorithm id out of range"));
        }
        Ok(Self { md_alg, bytes })
    }
}

/// Pack signature length and algorithm into the 16-bit record header field
pub fn pack_sigmeta(sig: Option<&Signature>) -> u16 {
    match sig {
        Some(s) => ((s.bytes.len() & 0xfff) as u16) | (((s.md_alg & 0xf) as u16) << 12),
        None => 0,
    }
}

/// Inverse of [`pack_sigmeta`]: `(signature length, digest algorithm)`
pub fn unpack_sigmeta(sigmeta: u16) -> (usize, u8) {
    ((sigmeta & 0xfff) as usize, ((sigmeta >> 12) & 0xf) as u8)
}

/// A single record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Datum {
    pub recno: Recno,
    pub ts: Timestamp,
    pub data: Bytes,
    pub sig: Option<Signature>,
}

impl Datum {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            recno: RECNO_NONE,
            ts: Timestamp::NONE,
            data: data.into(),
            sig: None,
        }
    }

    pub fn with_signature(mut self, sig: Signature) -> Self {
        self.sig = Some(sig);
        self
    }

    /// Bytes covered by a record signature: recno (8 bytes BE) then payload
    pub fn signed_bytes(&self) -> Vec<u8> {
        signed_bytes(self.recno, &self.data)
    }
}

pub fn signed_bytes(recno: Recno, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + data.len());
    buf.extend_from_slice(&recno.to_be_bytes());
    buf.extend_from_slice(data);
    buf
}

#[cfg(test)]
#[path = "datum_tests.rs"]
mod tests;
