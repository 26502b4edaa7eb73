//! Inbound request heads and the outbound origin request.
//!
//! # Responsibilities
//! - Hold the parsed client request head until the session extracts the
//!   method and path from it
//! - Serialize the signed origin request
//!
//! # Design Decisions
//! - The origin request is always `GET`, body-less and `connection: close`;
//!   nothing from the client head is forwarded

use bytes::{BufMut, Bytes, BytesMut};
use hyper::header::{HOST, USER_AGENT};
use hyper::{HeaderMap, Method};

use crate::signing::SignedRequest;

/// A decoded client request head.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    /// Request target exactly as sent, query included.
    pub target: String,
    /// HTTP minor version.
    pub version: u8,
    pub headers: HeaderMap,
}

impl RequestHead {
    /// The target without query or fragment.
    pub fn path(&self) -> &str {
        let end = self.target.find(['?', '#']).unwrap_or(self.target.len());
        &self.target[..end]
    }

    /// Protocol label for logs, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> &'static str {
        match self.version {
            0 => "HTTP/1.0",
            _ => "HTTP/1.1",
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.get(HOST).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
    }
}

/// Serialize the request sent to the origin.
pub fn encode_origin_request(signed: &SignedRequest) -> Bytes {
    let mut buf = BytesMut::with_capacity(256 + signed.target.len());
    buf.put_slice(b"GET ");
    buf.put_slice(signed.target.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    for (name, value) in &signed.headers {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"connection: close\r\n\r\n");
    buf.freeze()
}
