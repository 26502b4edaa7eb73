//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (session id, lifecycle tracking)
//!     → Hand off to relay::driver
//! ```
//!
//! # Design Decisions
//! - Bounded accepts prevent resource exhaustion
//! - Each session tracked for graceful shutdown
//! - TLS termination is left to a fronting load balancer

pub mod connection;
pub mod listener;

pub use connection::{SessionGuard, SessionId, SessionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
