//! Client for the S3 relay and its admin API.

pub mod client;

pub use client::{RelayClient, RelayStatus, RouteInfo};
