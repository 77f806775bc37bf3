// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use gdp_core::{ErrorKind, GdpError, Recno};
use std::io;
use thiserror::Error;

/// Errors that can occur in physical log operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("log {0} not found")]
    NotFound(String),
    #[error("log {0} already exists")]
    AlreadyExists(String),
    #[error("record {0} not found")]
    NoRecord(Recno),
    #[error("record {0} expired")]
    Expired(Recno),
    #[error("corrupt {what}: {detail}")]
    Corrupt { what: String, detail: String },
    #[error("log {0} is locked by another process")]
    Locked(String),
    #[error("bad record: {0}")]
    BadRecord(String),
}

impl StoreError {
    pub(crate) fn corrupt(what: impl Into<String>, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            what: what.into(),
            detail: detail.into(),
        }
    }
}

impl From<StoreError> for GdpError {
    fn from(e: StoreError) -> Self {
        let kind = match &e {
            StoreError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => ErrorKind::Corrupt,
            StoreError::Io(_) | StoreError::Locked(_) => ErrorKind::Internal,
            StoreError::NotFound(_) | StoreError::NoRecord(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::Expired(_) => ErrorKind::Expired,
            StoreError::Corrupt { .. } => ErrorKind::Corrupt,
            StoreError::BadRecord(_) => ErrorKind::BadRequest,
        };
        GdpError::new(kind, e.to_string())
    }
}
