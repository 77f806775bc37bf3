// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command, acknowledgement and NAK codes
//!
//! The code byte is partitioned by its leading bits:
//!
//! | range      | meaning                         |
//! |------------|---------------------------------|
//! | `0..=63`   | blind (unacknowledged) commands |
//! | `64..=127` | acknowledged commands           |
//! | `128..=191`| positive acks                   |
//! | `192..=223`| client-fault NAKs               |
//! | `224..=239`| server-fault NAKs               |
//! | `240..=254`| routing-fault NAKs              |

use gdp_core::ErrorKind;
use std::fmt;

/// Coarse classification of a code byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    Blind,
    Request,
    Ack,
    NakClient,
    NakServer,
    NakRouting,
    Reserved,
}

macro_rules! commands {
    ($($variant:ident = $code:literal, $label:literal;)*) => {
        /// Every code this implementation understands, plus a carrier for the rest
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Command {
            $($variant,)*
            /// A code with no assigned meaning; still classifiable by range
            Unassigned(u8),
        }

        impl Command {
            pub fn from_code(code: u8) -> Self {
                match code {
                    $($code => Command::$variant,)*
                    other => Command::Unassigned(other),
                }
            }

            pub fn code(self) -> u8 {
                match self {
                    $(Command::$variant => $code,)*
                    Command::Unassigned(c) => c,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Command::$variant => $label,)*
                    Command::Unassigned(_) => "UNASSIGNED",
                }
            }
        }
    };
}

commands! {
    Keepalive = 0, "KEEPALIVE";
    Advertise = 1, "ADVERTISE";
    Ping = 64, "PING";
    Hello = 65, "HELLO";
    Create = 66, "CREATE";
    OpenAo = 67, "OPEN_AO";
    OpenRo = 68, "OPEN_RO";
    Close = 69, "CLOSE";
    Read = 70, "READ";
    Append = 71, "APPEND";
    Subscribe = 72, "SUBSCRIBE";
    Multiread = 73, "MULTIREAD";
    GetMetadata = 74, "GETMETADATA";
    OpenRa = 75, "OPEN_RA";
    Unsubscribe = 76, "UNSUBSCRIBE";
    AckSuccess = 128, "ACK_SUCCESS";
    AckCreated = 129, "ACK_CREATED";
    AckDeleted = 130, "ACK_DELETED";
    AckValid = 131, "ACK_VALID";
    AckChanged = 132, "ACK_CHANGED";
    AckContent = 133, "ACK_CONTENT";
    NakBadRequest = 192, "NAK_C_BADREQ";
    NakUnauthorized = 193, "NAK_C_UNAUTH";
    NakBadOption = 194, "NAK_C_BADOPT";
    NakForbidden = 195, "NAK_C_FORBIDDEN";
    NakNotFound = 196, "NAK_C_NOTFOUND";
    NakMethodNotAllowed = 197, "NAK_C_METHNOTALLOWED";
    NakNotAcceptable = 198, "NAK_C_NOTACCEPTABLE";
    NakConflict = 201, "NAK_C_CONFLICT";
    NakGone = 202, "NAK_C_GONE";
    NakPreconditionFailed = 204, "NAK_C_PRECONFAILED";
    NakTooLarge = 205, "NAK_C_TOOLARGE";
    NakUnsupportedMedia = 207, "NAK_C_UNSUPMEDIA";
    NakInternal = 224, "NAK_S_INTERNAL";
    NakNotImplemented = 225, "NAK_S_NOTIMPL";
    NakBadGateway = 226, "NAK_S_BADGATEWAY";
    NakServiceUnavailable = 227, "NAK_S_SVCUNAVAIL";
    NakGatewayTimeout = 228, "NAK_S_GWTIMEOUT";
    NakProxyNotSupported = 229, "NAK_S_PROXYNOTSUP";
    NakLostSubscription = 239, "NAK_S_LOSTSUB";
    NakNoRoute = 240, "NAK_R_NOROUTE";
}

impl Command {
    pub fn class(self) -> CommandClass {
        match self.code() {
            0..=63 => CommandClass::Blind,
            64..=127 => CommandClass::Request,
            128..=191 => CommandClass::Ack,
            192..=223 => CommandClass::NakClient,
            224..=239 => CommandClass::NakServer,
            240..=254 => CommandClass::NakRouting,
            255 => CommandClass::Reserved,
        }
    }

    pub fn is_ack(self) -> bool {
        self.class() == CommandClass::Ack
    }

    pub fn is_nak(self) -> bool {
        matches!(
            self.class(),
            CommandClass::NakClient | CommandClass::NakServer | CommandClass::NakRouting
        )
    }

    /// Ack or NAK: something that answers a request
    pub fn is_response(self) -> bool {
        self.is_ack() || self.is_nak()
    }

    /// NAK code sent on the wire for an error kind
    pub fn nak_for(kind: ErrorKind) -> Command {
        match kind {
            ErrorKind::BadRequest => Command::NakBadRequest,
            ErrorKind::NotFound => Command::NakNotFound,
            ErrorKind::AlreadyExists | ErrorKind::SequenceError => Command::NakConflict,
            ErrorKind::BadIoMode => Command::NakMethodNotAllowed,
            ErrorKind::SignatureRequired | ErrorKind::SignatureInvalid => {
                Command::NakUnauthorized
            }
            ErrorKind::Expired => Command::NakGone,
            ErrorKind::Timeout => Command::NakGatewayTimeout,
            ErrorKind::NotImplemented => Command::NakNotImplemented,
            ErrorKind::RoutingFailure => Command::NakNoRoute,
            ErrorKind::Corrupt | ErrorKind::Internal => Command::NakInternal,
        }
    }

    /// Error kind a client reports for a NAK; `None` for non-NAK codes
    pub fn error_kind(self) -> Option<ErrorKind> {
        let kind = match self {
            Command::NakBadRequest | Command::NakBadOption => ErrorKind::BadRequest,
            Command::NakNotFound => ErrorKind::NotFound,
            Command::NakConflict => ErrorKind::SequenceError,
            Command::NakMethodNotAllowed | Command::NakForbidden => ErrorKind::BadIoMode,
            Command::NakUnauthorized => ErrorKind::SignatureInvalid,
            Command::NakGone => ErrorKind::Expired,
            Command::NakGatewayTimeout => ErrorKind::Timeout,
            Command::NakNotImplemented => ErrorKind::NotImplemented,
            _ => match self.class() {
                CommandClass::NakClient => ErrorKind::BadRequest,
                CommandClass::NakServer => ErrorKind::Internal,
                CommandClass::NakRouting => ErrorKind::RoutingFailure,
                _ => return None,
            },
        };
        Some(kind)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Unassigned(c) => write!(f, "CMD_{}", c),
            other => f.write_str(other.name()),
        }
    }
}

impl From<u8> for Command {
    fn from(code: u8) -> Self {
        Command::from_code(code)
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
