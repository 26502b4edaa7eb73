//! Streaming S3 relay library.
//!
//! Clients fetch objects by path; each request is routed to a bucket, signed
//! and forwarded to an S3-compatible origin, and the origin's body streams
//! back under backpressure.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod link;
pub mod net;
pub mod observability;
pub mod relay;
pub mod routing;
pub mod signing;

pub use config::schema::RelayConfig;
pub use http::RelayServer;
pub use lifecycle::Shutdown;
