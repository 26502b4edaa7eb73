//! Origin request signing.
//!
//! # Data Flow
//! ```text
//! (bucket, object key)
//!     → RequestSigner::sign
//!     → SignedRequest { target, headers }
//!     → http::request::encode_origin_request
//! ```
//!
//! # Design Decisions
//! - The session only sees the `RequestSigner` trait; tests swap in fixed
//!   signers, production uses `QueryPresigner`
//! - Signing is synchronous and cheap; no I/O happens here

pub mod presign;

use hyper::header::{HeaderName, HeaderValue};
use thiserror::Error;

pub use presign::QueryPresigner;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signing key rejected")]
    InvalidKey,

    #[error("origin credentials are not configured")]
    MissingCredentials,

    #[error("invalid header value: {0}")]
    InvalidHeader(String),
}

/// The origin request target and the headers that must accompany it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// Origin-form target, query included.
    pub target: String,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

/// Produces a time-limited signed request for one object.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, bucket: &str, key: &str) -> Result<SignedRequest, SignError>;
}
