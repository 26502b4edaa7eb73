//! Session failure types.

use std::io;

use thiserror::Error;

use crate::http::codec::CodecError;
use crate::relay::event::Side;
use crate::signing::SignError;

/// Why a session ended early.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("origin connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("origin write failed: {0}")]
    OriginWrite(#[source] io::Error),

    #[error("client write failed: {0}")]
    ClientWrite(#[source] io::Error),

    #[error("client closed the connection")]
    ClientClosed,

    #[error("origin closed the connection")]
    OriginClosed,

    #[error("client protocol error: {0}")]
    ClientProtocol(#[source] CodecError),

    #[error("origin protocol error: {0}")]
    OriginProtocol(#[source] CodecError),

    #[error("client link saturated")]
    ClientSaturated,

    #[error("request signing failed: {0}")]
    Sign(#[from] SignError),
}

impl RelayError {
    /// Wrap a decode failure reported by the link on `side`.
    pub fn protocol(side: Side, err: CodecError) -> Self {
        match side {
            Side::Client => RelayError::ClientProtocol(err),
            Side::Origin => RelayError::OriginProtocol(err),
        }
    }

    /// The leg the failure was observed on.
    pub fn side(&self) -> Side {
        match self {
            RelayError::ClientWrite(_)
            | RelayError::ClientClosed
            | RelayError::ClientProtocol(_)
            | RelayError::ClientSaturated => Side::Client,
            RelayError::Connect(_)
            | RelayError::OriginWrite(_)
            | RelayError::OriginClosed
            | RelayError::OriginProtocol(_)
            | RelayError::Sign(_) => Side::Origin,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            RelayError::Connect(_) => Outcome::ConnectFailed,
            RelayError::OriginWrite(_)
            | RelayError::OriginClosed
            | RelayError::OriginProtocol(_)
            | RelayError::Sign(_) => Outcome::OriginFailed,
            RelayError::ClientProtocol(e) if e.is_framing() => Outcome::BadRequest,
            RelayError::ClientWrite(_) | RelayError::ClientClosed | RelayError::ClientProtocol(_) => {
                Outcome::ClientAborted
            }
            RelayError::ClientSaturated => Outcome::Saturated,
        }
    }
}

/// How a session ended, used for logs and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Relayed,
    NotFound,
    Forbidden,
    MethodNotAllowed,
    BadRequest,
    UpstreamError,
    ConnectFailed,
    OriginFailed,
    ClientAborted,
    Saturated,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Relayed => "relayed",
            Outcome::NotFound => "not_found",
            Outcome::Forbidden => "forbidden",
            Outcome::MethodNotAllowed => "method_not_allowed",
            Outcome::BadRequest => "bad_request",
            Outcome::UpstreamError => "upstream_error",
            Outcome::ConnectFailed => "connect_failed",
            Outcome::OriginFailed => "origin_failed",
            Outcome::ClientAborted => "client_aborted",
            Outcome::Saturated => "saturated",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
