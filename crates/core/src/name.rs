// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! 256-bit log names and their printable form

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::GdpError;

/// Length of a name in bytes
pub const NAME_LEN: usize = 32;

/// Length of the printable (unpadded base64) form
pub const PNAME_LEN: usize = 43;

/// Opaque 256-bit identifier of a log or a node
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GdpName([u8; NAME_LEN]);

impl GdpName {
    /// The all-zero name, meaning "unset"
    pub const ZERO: GdpName = GdpName([0; NAME_LEN]);

    pub const fn new(bytes: [u8; NAME_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, GdpError> {
        let raw: [u8; NAME_LEN] = bytes.try_into().map_err(|_| {
            GdpError::bad_request(format!("name must be {} bytes, got {}", NAME_LEN, bytes.len()))
        })?;
        Ok(Self(raw))
    }

    /// Derive a name as the SHA-256 of arbitrary content
    pub fn digest(content: &[u8]) -> Self {
        Self(Sha256::digest(content).into())
    }

    /// Derive a name from a human-oriented alias
    pub fn from_alias(alias: &str) -> Self {
        Self::digest(alias.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; NAME_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; NAME_LEN]
    }

    /// Printable form: URL-safe base64 without padding
    pub fn printable(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Short prefix used in log lines
    pub fn short(&self) -> String {
        let mut p = self.printable();
        p.truncate(8);
        p
    }

    /// Two hex digits used to fan logs out into subdirectories
    pub fn shard(&self) -> String {
        format!("_{:02x}", self.0[0])
    }

    /// Parse either a printable name or, failing that, treat the input as an alias
    pub fn parse_or_alias(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| Self::from_alias(s))
    }
}

impl FromStr for GdpName {
    type Err = GdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != PNAME_LEN {
            return Err(GdpError::bad_request(format!(
                "printable name must be {} characters",
                PNAME_LEN
            )));
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| GdpError::bad_request(format!("invalid printable name: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for GdpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.printable())
    }
}

impl fmt::Debug for GdpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GdpName({})", self.short())
    }
}

impl From<[u8; NAME_LEN]> for GdpName {
    fn from(bytes: [u8; NAME_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
#[path = "name_tests.rs"]
mod tests;
