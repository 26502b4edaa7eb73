//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::config::validation::{validate_config, ValidationError};

const ACCESS_KEY_ENV: &str = "RELAY_ACCESS_KEY_ID";
const SECRET_KEY_ENV: &str = "RELAY_SECRET_ACCESS_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Origin credentials may be supplied through `RELAY_ACCESS_KEY_ID` and
/// `RELAY_SECRET_ACCESS_KEY`, which override the file.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

fn apply_env_overrides(config: &mut RelayConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(value) = lookup(ACCESS_KEY_ENV).filter(|v| !v.is_empty()) {
        config.origin.access_key_id = value;
    }
    if let Some(value) = lookup(SECRET_KEY_ENV).filter(|v| !v.is_empty()) {
        config.origin.secret_access_key = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides_credentials() {
        let mut config = parse_config(
            r#"
            [origin]
            access_key_id = "from-file"
            secret_access_key = "from-file"
            "#,
        )
        .unwrap();

        apply_env_overrides(&mut config, |name| match name {
            SECRET_KEY_ENV => Some("from-env".to_string()),
            _ => None,
        });
        assert_eq!(config.origin.access_key_id, "from-file");
        assert_eq!(config.origin.secret_access_key, "from-env");
    }

    #[test]
    fn test_load_reports_validation_errors() {
        let dir = std::env::temp_dir().join(format!("s3-relay-config-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("relay.toml");
        fs::write(&path, "[listener]\nmax_connections = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("listener.max_connections"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse_config("routes = 3"), Err(ConfigError::Parse(_))));
    }
}
