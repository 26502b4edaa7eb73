//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Request target
//!     → sanitize.rs (strip query, percent-decode, reject traversal)
//!     → router.rs (route lookup by mount point)
//!     → matcher.rs (segment-boundary prefix match)
//!     → Return: matched Route (bucket) or NoMatch
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Sort by mount length, longest first
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per config generation, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;
pub mod sanitize;

pub use router::{Route, Router};
pub use sanitize::{object_key, sanitize_path, PathError};
