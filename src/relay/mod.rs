//! Streaming relay subsystem.
//!
//! # Data Flow
//! ```text
//! accepted client stream
//!     → driver.rs (client FlowLink, wait for request head, route lookup)
//!     → session.rs (validate → connect → sign & send → relay)
//!         ↑ events from both links and from finished writes
//!     → policy.rs (error page + close mode on failure)
//!     → both links closed, outcome recorded
//! ```
//!
//! # Design Decisions
//! - One task per client connection; session state is touched by that task only
//! - Exactly one origin connection per session, never reused
//! - Backpressure is symmetric: a saturated client pauses origin reads

pub mod driver;
pub mod error;
pub mod event;
pub mod policy;
pub mod session;

pub use driver::{drive, serve_connection, RelayContext};
pub use error::{Outcome, RelayError};
pub use event::{BodyChunk, RelayEvent, Side};
pub use session::{RelaySession, SessionState};
