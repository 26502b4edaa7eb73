//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, watermarks ordered, ports valid)
//! - Detect duplicate route names and mounts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::routing::matcher::MountMatcher;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("origin host is empty")]
    EmptyOriginHost,

    #[error("write_low_watermark must be below write_high_watermark")]
    WatermarkOrder,

    #[error("route {0:?} has an empty name or bucket")]
    IncompleteRoute(String),

    #[error("route {name:?} mount {mount:?} must start with '/'")]
    RelativeMount { name: String, mount: String },

    #[error("duplicate route name {0:?}")]
    DuplicateName(String),

    #[error("duplicate mount {0:?}")]
    DuplicateMount(String),

    #[error("admin API enabled without an api_key")]
    MissingAdminKey,
}

pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if config.origin.host.trim().is_empty() {
        errors.push(ValidationError::EmptyOriginHost);
    }
    if config.origin.port == 0 {
        errors.push(ValidationError::Zero("origin.port"));
    }
    if config.origin.url_expiry_secs == 0 {
        errors.push(ValidationError::Zero("origin.url_expiry_secs"));
    }

    let limits = &config.limits;
    for (field, value) in [
        ("limits.max_request_head_bytes", limits.max_request_head_bytes),
        ("limits.max_response_head_bytes", limits.max_response_head_bytes),
        ("limits.write_high_watermark", limits.write_high_watermark),
        ("limits.read_buffer_size", limits.read_buffer_size),
        ("limits.event_queue_depth", limits.event_queue_depth),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }
    if limits.write_low_watermark >= limits.write_high_watermark {
        errors.push(ValidationError::WatermarkOrder);
    }

    let mut names = HashSet::new();
    let mut mounts = HashSet::new();
    for route in &config.routes {
        if route.name.is_empty() || route.bucket.is_empty() {
            errors.push(ValidationError::IncompleteRoute(route.name.clone()));
        }
        if !route.mount.starts_with('/') {
            errors.push(ValidationError::RelativeMount {
                name: route.name.clone(),
                mount: route.mount.clone(),
            });
        }
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateName(route.name.clone()));
        }
        let mount = MountMatcher::new(route.mount.clone()).mount().to_string();
        if !mounts.insert(mount.clone()) {
            errors.push(ValidationError::DuplicateMount(mount));
        }
    }

    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::MissingAdminKey);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn route(name: &str, mount: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            mount: mount.to_string(),
            bucket: "bucket".to_string(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&RelayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RelayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.limits.write_low_watermark = config.limits.write_high_watermark;
        config.routes = vec![route("a", "/media"), route("a", "/media/"), route("b", "media")];

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: "not-an-address".to_string(),
        }));
        assert!(errors.contains(&ValidationError::WatermarkOrder));
        assert!(errors.contains(&ValidationError::DuplicateName("a".to_string())));
        assert!(errors.contains(&ValidationError::DuplicateMount("/media".to_string())));
        assert!(errors.contains(&ValidationError::RelativeMount {
            name: "b".to_string(),
            mount: "media".to_string(),
        }));
    }

    #[test]
    fn test_admin_requires_key() {
        let mut config = RelayConfig::default();
        config.admin.enabled = true;
        assert_eq!(validate_config(&config), Err(vec![ValidationError::MissingAdminKey]));
    }
}
