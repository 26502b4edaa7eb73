//! Events consumed by a relay session.
//!
//! Every input a session reacts to arrives as one [`RelayEvent`]: decoded
//! protocol messages from either link, connect and write completions, and
//! link state changes. The session handles them one at a time.

use std::io;

use bytes::Bytes;

use crate::http::codec::CodecError;
use crate::http::request::RequestHead;
use crate::http::response::ResponseHead;

/// Which leg of the relay an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The connection to the original client.
    Client,
    /// The connection to the object-storage origin.
    Origin,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Origin => "origin",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fragment of a response body, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyChunk {
    pub data: Bytes,
    /// Set on the fragment that completes the body.
    pub last: bool,
}

impl BodyChunk {
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: false,
        }
    }

    pub fn last(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            last: true,
        }
    }
}

/// Everything that can happen to a session.
#[derive(Debug)]
pub enum RelayEvent {
    /// Client sent a complete request head.
    RequestHead(RequestHead),
    /// A link finished connecting.
    Connected(Side),
    /// A link failed to connect.
    ConnectFailed(Side, io::Error),
    /// Completion of the signed request write to the origin.
    RequestSent(io::Result<()>),
    /// Origin sent a complete response head.
    ResponseHead(ResponseHead),
    /// Origin sent a body fragment.
    BodyChunk(BodyChunk),
    /// A write on the given side reached the socket.
    WriteCompleted(Side),
    /// A write on the given side failed.
    WriteFailed(Side, io::Error),
    /// The given side's link changed writability.
    WritabilityChanged(Side, bool),
    /// The given side sent something that could not be decoded.
    Error(Side, CodecError),
    /// The peer on the given side closed the connection.
    Closed(Side),
}

impl RelayEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayEvent::RequestHead(_) => "request_head",
            RelayEvent::Connected(_) => "connected",
            RelayEvent::ConnectFailed(..) => "connect_failed",
            RelayEvent::RequestSent(_) => "request_sent",
            RelayEvent::ResponseHead(_) => "response_head",
            RelayEvent::BodyChunk(_) => "body_chunk",
            RelayEvent::WriteCompleted(_) => "write_completed",
            RelayEvent::WriteFailed(..) => "write_failed",
            RelayEvent::WritabilityChanged(..) => "writability_changed",
            RelayEvent::Error(..) => "error",
            RelayEvent::Closed(_) => "closed",
        }
    }
}
