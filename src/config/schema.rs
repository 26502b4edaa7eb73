//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::link::LinkOptions;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Object-storage origin and credentials.
    pub origin: OriginConfig,

    /// Mount points mapping request paths to buckets.
    pub routes: Vec<RouteConfig>,

    /// Buffer and head-size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub lifecycle: LifecycleConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// The object-storage origin every session connects to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Origin host name or IP.
    pub host: String,

    /// Origin port (plain HTTP).
    pub port: u16,

    /// Signing region.
    pub region: String,

    pub access_key_id: String,

    pub secret_access_key: String,

    /// Lifetime of each presigned request in seconds.
    pub url_expiry_secs: u64,

    /// Address buckets as `{bucket}.{host}` instead of `/{bucket}/...`.
    pub virtual_host: bool,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            host: "s3.amazonaws.com".to_string(),
            port: 80,
            region: "us-east-1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            url_expiry_secs: 300,
            virtual_host: false,
        }
    }
}

/// Route configuration mapping a mount point to a bucket.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix, matched on segment boundaries.
    pub mount: String,

    /// Bucket serving requests below the mount.
    pub bucket: String,
}

/// Head-size limits and per-link buffering.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted client request head; larger heads get 400.
    pub max_request_head_bytes: usize,

    /// Largest accepted origin response head.
    pub max_response_head_bytes: usize,

    /// Unflushed bytes at which a link stops being writable.
    pub write_high_watermark: usize,

    /// Unflushed bytes at which a saturated link resumes.
    pub write_low_watermark: usize,

    /// Initial read buffer per link.
    pub read_buffer_size: usize,

    /// Events buffered per session before links stop reading.
    pub event_queue_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_head_bytes: 8 * 1024,
            max_response_head_bytes: 16 * 1024,
            write_high_watermark: 64 * 1024,
            write_low_watermark: 32 * 1024,
            read_buffer_size: 8 * 1024,
            event_queue_depth: 16,
        }
    }
}

impl LimitsConfig {
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            high_watermark: self.write_high_watermark,
            low_watermark: self.write_low_watermark,
            read_buffer_size: self.read_buffer_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long shutdown waits for in-flight sessions.
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
        }
    }
}
