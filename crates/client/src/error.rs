// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client errors

use gdp_core::{ErrorKind, GdpError, ParamsError};
use gdp_protocol::{Command, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The daemon refused the request, or a local check failed
    #[error(transparent)]
    Gdp(#[from] GdpError),

    #[error("No response after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("Connection to daemon closed")]
    Disconnected,

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(Command),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Parameter error: {0}")]
    Params(#[from] ParamsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Error kind as the rest of the system classifies it
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Gdp(e) => e.kind,
            ClientError::TimedOut { .. } => ErrorKind::Timeout,
            ClientError::Disconnected | ClientError::Io(_) => ErrorKind::RoutingFailure,
            ClientError::Protocol(ProtocolError::Timeout) => ErrorKind::Timeout,
            ClientError::Protocol(ProtocolError::ConnectionClosed | ProtocolError::Io(_)) => {
                ErrorKind::RoutingFailure
            }
            ClientError::Protocol(_) => ErrorKind::BadRequest,
            ClientError::UnexpectedResponse(_) => ErrorKind::Internal,
            ClientError::Params(_) => ErrorKind::BadRequest,
        }
    }
}

impl From<ClientError> for GdpError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Gdp(e) => e,
            other => GdpError::new(other.kind(), other.to_string()),
        }
    }
}
