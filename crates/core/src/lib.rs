// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gdp-core: Data model for the Global Data Plane log service
//!
//! This crate provides:
//! - Log names, metadata and records
//! - The error taxonomy shared by storage, protocol and engine
//! - Clock and signing capabilities with fakes for tests
//! - Typed parameter lookup

pub mod clock;
pub mod crypto;
pub mod datum;
pub mod error;
pub mod iomode;
pub mod metadata;
pub mod name;
pub mod params;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use crypto::{NoVerifier, SignaturePolicy, Signer, Verifier};
pub use datum::{resolve_recno, Datum, Recno, Signature, Timestamp};
pub use error::{ErrorKind, Fault, GdpError, Result};
pub use iomode::IoMode;
pub use metadata::{Metadata, PublicKey};
pub use name::GdpName;
pub use params::{Params, ParamsError};

#[cfg(any(test, feature = "test-support"))]
pub use crypto::FakeSigner;
