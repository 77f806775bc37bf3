// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by every layer of the log service
//!
//! Storage, codec and engine errors all collapse into a [`GdpError`] whose
//! [`ErrorKind`] decides which negative acknowledgement goes on the wire.

use std::fmt;
use thiserror::Error;

/// Which side of the conversation is to blame for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Client,
    Server,
    Routing,
}

/// Kind of failure, independent of where it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request or payload
    BadRequest,
    /// Unknown log or record
    NotFound,
    /// Create collided with an existing log
    AlreadyExists,
    /// Bad magic, version or truncated on-disk structure
    Corrupt,
    /// Operation not permitted by the handle's I/O mode
    BadIoMode,
    /// Append carried the wrong expected record number
    SequenceError,
    SignatureRequired,
    SignatureInvalid,
    /// Record was reclaimed by retention
    Expired,
    Timeout,
    RoutingFailure,
    NotImplemented,
    /// Catch-all server fault
    Internal,
}

impl ErrorKind {
    /// Classify this kind into the party at fault
    pub fn fault(self) -> Fault {
        match self {
            ErrorKind::BadRequest
            | ErrorKind::NotFound
            | ErrorKind::AlreadyExists
            | ErrorKind::BadIoMode
            | ErrorKind::SequenceError
            | ErrorKind::SignatureRequired
            | ErrorKind::SignatureInvalid
            | ErrorKind::Expired => Fault::Client,
            ErrorKind::Corrupt
            | ErrorKind::Timeout
            | ErrorKind::NotImplemented
            | ErrorKind::Internal => Fault::Server,
            ErrorKind::RoutingFailure => Fault::Routing,
        }
    }

    /// Whether a client may usefully retry a request that failed this way
    pub fn is_retryable(self) -> bool {
        self.fault() != Fault::Client
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad request",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::BadIoMode => "bad I/O mode",
            ErrorKind::SequenceError => "record sequence error",
            ErrorKind::SignatureRequired => "signature required",
            ErrorKind::SignatureInvalid => "signature invalid",
            ErrorKind::Expired => "record expired",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RoutingFailure => "no route",
            ErrorKind::NotImplemented => "not implemented",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error kind plus a human-readable explanation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct GdpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GdpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Corrupt, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<std::io::Error> for GdpError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            std::io::ErrorKind::UnexpectedEof => ErrorKind::Corrupt,
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

pub type Result<T, E = GdpError> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
