// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gdp-protocol: Wire codec for the Global Data Plane
//!
//! Frames (PDUs) are encoded into a single contiguous buffer and decoded
//! incrementally from a streaming reader.

pub mod command;
pub mod io;
pub mod pdu;

pub use command::{Command, CommandClass};
pub use io::{read_pdu, read_pdu_timeout, write_pdu, DEFAULT_TIMEOUT};
pub use pdu::{
    decode, encode, encode_into, Pdu, ProtocolError, DEFAULT_PORT, DEFAULT_TTL, HEADER_LEN,
    PROTO_VERSION,
};
