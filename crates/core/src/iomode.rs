// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access modes for open logs

use std::fmt;

/// What a handle is allowed to do with its log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IoMode {
    #[default]
    None,
    ReadOnly,
    AppendOnly,
    ReadAppend,
}

impl IoMode {
    fn bits(self) -> u8 {
        match self {
            IoMode::None => 0,
            IoMode::ReadOnly => 1,
            IoMode::AppendOnly => 2,
            IoMode::ReadAppend => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            1 => IoMode::ReadOnly,
            2 => IoMode::AppendOnly,
            3 => IoMode::ReadAppend,
            _ => IoMode::None,
        }
    }

    /// Widen to cover both modes; never narrows
    pub fn union(self, other: IoMode) -> IoMode {
        Self::from_bits(self.bits() | other.bits())
    }

    pub fn can_read(self) -> bool {
        self.bits() & 1 != 0
    }

    pub fn can_append(self) -> bool {
        self.bits() & 2 != 0
    }

    /// Whether `self` grants everything `wanted` asks for
    pub fn allows(self, wanted: IoMode) -> bool {
        self.bits() & wanted.bits() == wanted.bits()
    }
}

impl fmt::Display for IoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoMode::None => "none",
            IoMode::ReadOnly => "ro",
            IoMode::AppendOnly => "ao",
            IoMode::ReadAppend => "ra",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        ro_ao = { IoMode::ReadOnly, IoMode::AppendOnly, IoMode::ReadAppend },
        ro_ro = { IoMode::ReadOnly, IoMode::ReadOnly, IoMode::ReadOnly },
        ra_ro = { IoMode::ReadAppend, IoMode::ReadOnly, IoMode::ReadAppend },
        none_ao = { IoMode::None, IoMode::AppendOnly, IoMode::AppendOnly },
    )]
    fn union_never_narrows(a: IoMode, b: IoMode, expected: IoMode) {
        assert_eq!(a.union(b), expected);
    }

    #[test]
    fn allows_checks_subset() {
        assert!(IoMode::ReadAppend.allows(IoMode::ReadOnly));
        assert!(!IoMode::ReadOnly.allows(IoMode::AppendOnly));
        assert!(IoMode::AppendOnly.can_append());
        assert!(!IoMode::AppendOnly.can_read());
    }
}
