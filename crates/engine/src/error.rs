// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use gdp_core::{ErrorKind, GdpError, GdpName};
use thiserror::Error;

use crate::request::RequestState;

/// Errors from the handle cache
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("handle for {0} is being dropped")]
    Dropping(GdpName),
    #[error("name already cached: {0}")]
    Exists(GdpName),
    #[error("handle not cached under {0}")]
    NotCached(GdpName),
}

impl From<CacheError> for GdpError {
    fn from(e: CacheError) -> Self {
        let kind = match e {
            CacheError::Exists(_) => ErrorKind::AlreadyExists,
            CacheError::Dropping(_) | CacheError::NotCached(_) => ErrorKind::Internal,
        };
        GdpError::new(kind, e.to_string())
    }
}

/// Attempted move the request state machine does not allow
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid request transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: RequestState,
    pub to: RequestState,
}

impl From<TransitionError> for GdpError {
    fn from(e: TransitionError) -> Self {
        GdpError::internal(e.to_string())
    }
}
