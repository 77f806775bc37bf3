// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable log metadata
//!
//! Metadata is an ordered list of `(id, value)` entries attached to a log at
//! creation time. The serialized form is
//! `count u16, count x (id u32, len u32), values...`, all big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{GdpError, Result};
use crate::name::GdpName;

/// Reserved metadata ids
pub mod ids {
    /// External alias
    pub const XID: u32 = 0x0058_4944;
    /// Creation time (RFC 3339 text)
    pub const CTIME: u32 = 0x0043_544D;
    /// Public signing key
    pub const PUBKEY: u32 = 0x0050_5542;
    pub const NONCE: u32 = 0x004E_4F4E;
}

/// Upper bound on entries in one metadata block
pub const MAX_ENTRIES: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub id: u32,
    pub value: Bytes,
}

/// Ordered metadata set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<MetadataEntry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; entries keep insertion order
    pub fn add(&mut self, id: u32, value: impl Into<Bytes>) -> Result<()> {
        if self.entries.len() >= MAX_ENTRIES {
            return Err(GdpError::bad_request("too many metadata entries"));
        }
        self.entries.push(MetadataEntry {
            id,
            value: value.into(),
        });
        Ok(())
    }

    /// Builder-style variant of [`Metadata::add`] for a handful of entries
    pub fn with(mut self, id: u32, value: impl Into<Bytes>) -> Result<Self> {
        self.add(id, value)?;
        Ok(self)
    }

    /// First entry with the given id
    pub fn find(&self, id: u32) -> Option<&Bytes> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.value)
    }

    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// External alias, if one was recorded
    pub fn alias(&self) -> Option<String> {
        self.find(ids::XID)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Public key entry, parsed
    pub fn public_key(&self) -> Result<Option<PublicKey>> {
        self.find(ids::PUBKEY).map(|v| PublicKey::parse(v)).transpose()
    }

    /// Size of the `(id, len)` table plus values, excluding the count
    pub fn body_len(&self) -> usize {
        self.entries.iter().map(|e| 8 + e.value.len()).sum()
    }

    /// Write the `(id, len)` pairs followed by the values, without a count
    pub fn write_body(&self, buf: &mut impl BufMut) {
        for e in &self.entries {
            buf.put_u32(e.id);
            buf.put_u32(e.value.len() as u32);
        }
        for e in &self.entries {
            buf.put_slice(&e.value);
        }
    }

    /// Parse a body of `count` entries as written by [`Metadata::write_body`]
    pub fn read_body(count: usize, buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < count * 8 {
            return Err(GdpError::corrupt("metadata table truncated"));
        }
        let mut table = Vec::with_capacity(count);
        for _ in 0..count {
            let id = buf.get_u32();
            let len = buf.get_u32() as usize;
            table.push((id, len));
        }
        let mut entries = Vec::with_capacity(count);
        for (id, len) in table {
            if buf.remaining() < len {
                return Err(GdpError::corrupt("metadata value truncated"));
            }
            entries.push(MetadataEntry {
                id,
                value: buf.copy_to_bytes(len),
            });
        }
        Ok(Self { entries })
    }

    /// Serialize with a leading `u16` count
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.body_len());
        buf.put_u16(self.entries.len() as u16);
        self.write_body(&mut buf);
        buf.freeze()
    }

    /// Parse a block produced by [`Metadata::serialize`]
    pub fn deserialize(mut buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(GdpError::bad_request("metadata missing entry count"));
        }
        let count = buf.get_u16() as usize;
        Self::read_body(count, &mut buf).map_err(|e| GdpError::bad_request(e.message))
    }

    /// Content-derived log name: SHA-256 over the serialized form
    pub fn derive_name(&self) -> GdpName {
        GdpName::digest(&self.serialize())
    }
}

/// Public key stored under [`ids::PUBKEY`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Digest algorithm used with this key
    pub md_alg: u8,
    pub key_type: u8,
    pub bits: u16,
    /// DER-encoded key material
    pub der: Bytes,
}

impl PublicKey {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < 4 {
            return Err(GdpError::bad_request("public key metadata too short"));
        }
        let mut buf = raw;
        let md_alg = buf.get_u8();
        let key_type = buf.get_u8();
        let bits = buf.get_u16();
        Ok(Self {
            md_alg,
            key_type,
            bits,
            der: Bytes::copy_from_slice(buf),
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + self.der.len());
        buf.put_u8(self.md_alg);
        buf.put_u8(self.key_type);
        buf.put_u16(self.bits);
        buf.put_slice(&self.der);
        buf.freeze()
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
