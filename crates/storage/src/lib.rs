// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! gdp-storage: Physical log storage
//!
//! Each log is a set of append-only extent files plus one index file that
//! maps record numbers to extent offsets.

mod error;
mod extent;
mod index;
pub mod layout;
mod physlog;

pub use error::StoreError;
pub use extent::Extent;
pub use index::Index;
pub use layout::IndexEntry;
pub use physlog::{LogStore, StoreOptions};
