// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk headers and file naming
//!
//! Every multi-byte integer is big-endian.

use bytes::{Buf, BufMut};
use gdp_core::datum::{pack_sigmeta, unpack_sigmeta};
use gdp_core::{Datum, GdpName, Recno, Timestamp};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const EXTENT_MAGIC: u32 = 0x4743_4C44; // "GCLD"
pub const EXTENT_VERSION: u32 = 1;
pub const EXTENT_MIN_VERSION: u32 = 1;
pub const EXTENT_MAX_VERSION: u32 = 1;
pub const EXTENT_HEADER_LEN: usize = 72;

pub const INDEX_MAGIC: u32 = 0x4743_4C58; // "GCLX"
pub const INDEX_VERSION: u32 = 1;
pub const INDEX_HEADER_LEN: usize = 24;
pub const INDEX_ENTRY_LEN: usize = 24;

pub const RECORD_HEADER_LEN: usize = 40;

pub const DATA_SUFFIX: &str = "data";
pub const INDEX_SUFFIX: &str = "index";

/// Fixed part of an extent file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentHeader {
    pub magic: u32,
    pub version: u32,
    /// Header plus metadata; records start here
    pub header_size: u32,
    pub md_count: u16,
    pub log_type: u16,
    pub extent: u32,
    pub name: GdpName,
    /// Records in this extent start at `recno_offset + 1`
    pub recno_offset: Recno,
}

impl ExtentHeader {
    pub fn new(name: GdpName, extent: u32, recno_offset: Recno, md_count: u16, md_len: usize) -> Self {
        Self {
            magic: EXTENT_MAGIC,
            version: EXTENT_VERSION,
            header_size: (EXTENT_HEADER_LEN + md_len) as u32,
            md_count,
            log_type: 0,
            extent,
            name,
            recno_offset,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.magic);
        buf.put_u32(self.version);
        buf.put_u32(self.header_size);
        buf.put_u32(0);
        buf.put_u16(self.md_count);
        buf.put_u16(self.log_type);
        buf.put_u32(self.extent);
        buf.put_u64(0);
        buf.put_slice(self.name.as_bytes());
        buf.put_i64(self.recno_offset);
    }

    /// Decode and validate magic, version and header size
    pub fn decode(mut buf: &[u8]) -> Result<Self, StoreError> {
        if buf.len() < EXTENT_HEADER_LEN {
            return Err(StoreError::corrupt("extent header", "truncated"));
        }
        let magic = buf.get_u32();
        if magic != EXTENT_MAGIC {
            return Err(StoreError::corrupt(
                "extent header",
                format!("bad magic {:#010x}", magic),
            ));
        }
        let version = buf.get_u32();
        if !(EXTENT_MIN_VERSION..=EXTENT_MAX_VERSION).contains(&version) {
            return Err(StoreError::corrupt(
                "extent header",
                format!("unsupported version {}", version),
            ));
        }
        let header_size = buf.get_u32();
        if (header_size as usize) < EXTENT_HEADER_LEN {
            return Err(StoreError::corrupt(
                "extent header",
                format!("header size {} too small", header_size),
            ));
        }
        buf.advance(4);
        let md_count = buf.get_u16();
        let log_type = buf.get_u16();
        let extent = buf.get_u32();
        buf.advance(8);
        let mut name = [0u8; 32];
        buf.copy_to_slice(&mut name);
        let recno_offset = buf.get_i64();
        Ok(Self {
            magic,
            version,
            header_size,
            md_count,
            log_type,
            extent,
            name: GdpName::new(name),
            recno_offset,
        })
    }
}

/// Per-record header preceding payload and signature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    pub recno: Recno,
    pub ts: Timestamp,
    pub sigmeta: u16,
    pub data_length: u64,
}

impl RecordHeader {
    pub fn for_datum(datum: &Datum) -> Self {
        Self {
            recno: datum.recno,
            ts: datum.ts,
            sigmeta: pack_sigmeta(datum.sig.as_ref()),
            data_length: datum.data.len() as u64,
        }
    }

    pub fn sig_len(&self) -> usize {
        unpack_sigmeta(self.sigmeta).0
    }

    pub fn md_alg(&self) -> u8 {
        unpack_sigmeta(self.sigmeta).1
    }

    /// Header, payload and signature together; `None` if the declared
    /// lengths do not fit in a `u64`
    pub fn record_len(&self) -> Option<u64> {
        (RECORD_HEADER_LEN as u64 + self.sig_len() as u64).checked_add(self.data_length)
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.recno);
        buf.put_i64(self.ts.sec);
        buf.put_u32(self.ts.nsec);
        buf.put_u32(self.ts.accuracy.to_bits());
        buf.put_u16(self.sigmeta);
        buf.put_u16(0);
        buf.put_u32(0);
        buf.put_u64(self.data_length);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, StoreError> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(StoreError::corrupt("record header", "truncated"));
        }
        let recno = buf.get_i64();
        let sec = buf.get_i64();
        let nsec = buf.get_u32();
        let accuracy = f32::from_bits(buf.get_u32());
        let sigmeta = buf.get_u16();
        buf.advance(6);
        let data_length = buf.get_u64();
        Ok(Self {
            recno,
            ts: Timestamp { sec, nsec, accuracy },
            sigmeta,
            data_length,
        })
    }
}

/// Fixed header of the index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub min_recno: Recno,
}

impl IndexHeader {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(INDEX_MAGIC);
        buf.put_u32(INDEX_VERSION);
        buf.put_u32(INDEX_HEADER_LEN as u32);
        buf.put_u32(0);
        buf.put_i64(self.min_recno);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, StoreError> {
        if buf.len() < INDEX_HEADER_LEN {
            return Err(StoreError::corrupt("index header", "truncated"));
        }
        let magic = buf.get_u32();
        if magic != INDEX_MAGIC {
            return Err(StoreError::corrupt(
                "index header",
                format!("bad magic {:#010x}", magic),
            ));
        }
        let version = buf.get_u32();
        if version != INDEX_VERSION {
            return Err(StoreError::corrupt(
                "index header",
                format!("unsupported version {}", version),
            ));
        }
        let header_size = buf.get_u32();
        if header_size as usize != INDEX_HEADER_LEN {
            return Err(StoreError::corrupt(
                "index header",
                format!("header size {}", header_size),
            ));
        }
        buf.advance(4);
        let min_recno = buf.get_i64();
        if min_recno < 1 {
            return Err(StoreError::corrupt(
                "index header",
                format!("first record {}", min_recno),
            ));
        }
        Ok(Self { min_recno })
    }
}

/// Location of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub recno: Recno,
    pub offset: u64,
    pub extent: u32,
}

impl IndexEntry {
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.recno);
        buf.put_i64(self.offset as i64);
        buf.put_u32(self.extent);
        buf.put_u32(0);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, StoreError> {
        if buf.len() < INDEX_ENTRY_LEN {
            return Err(StoreError::corrupt("index entry", "truncated"));
        }
        let recno = buf.get_i64();
        let offset = buf.get_i64();
        if offset < 0 {
            return Err(StoreError::corrupt(
                "index entry",
                format!("negative offset for recno {}", recno),
            ));
        }
        Ok(Self {
            recno,
            offset: offset as u64,
            extent: buf.get_u32(),
        })
    }
}

/// Directory holding one log's files: `<root>/_<hh>`
pub fn log_dir(root: &Path, name: &GdpName) -> PathBuf {
    root.join(name.shard())
}

pub fn extent_path(root: &Path, name: &GdpName, extent: u32) -> PathBuf {
    log_dir(root, name).join(format!("{}-{:06}.{}", name.printable(), extent, DATA_SUFFIX))
}

pub fn index_path(root: &Path, name: &GdpName) -> PathBuf {
    log_dir(root, name).join(format!("{}.{}", name.printable(), INDEX_SUFFIX))
}

/// Parse `<pname>-<extent>.data` into its extent number when it belongs to `name`
pub fn parse_extent_file(file_name: &str, name: &GdpName) -> Option<u32> {
    let stem = file_name.strip_suffix(DATA_SUFFIX)?.strip_suffix('.')?;
    let (pname, ext) = stem.rsplit_once('-')?;
    if pname != name.printable() {
        return None;
    }
    ext.parse().ok()
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
