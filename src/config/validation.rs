//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check addresses and static serving options
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ServerConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServerConfig;
use crate::static_files::Encoding;

/// Minimum accepted `scan_interval_ms`.
pub const MIN_SCAN_INTERVAL_MS: u64 = 100;

/// One failed check, named by its dotted config path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a deserialized config, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }

    let statics = &config.static_files;
    if !statics.url_base.starts_with('/') {
        errors.push(ValidationError::new("static_files.url_base", "must start with '/'"));
    }
    if statics.enabled && statics.root_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new(
            "static_files.root_dir",
            "required when static serving is enabled",
        ));
    }
    if statics.max_files == Some(0) {
        errors.push(ValidationError::new("static_files.max_files", "must be greater than 0"));
    }
    if statics.max_depth == Some(0) {
        errors.push(ValidationError::new("static_files.max_depth", "must be greater than 0"));
    }
    if statics
        .scan_interval_ms
        .is_some_and(|ms| ms < MIN_SCAN_INTERVAL_MS)
    {
        errors.push(ValidationError::new(
            "static_files.scan_interval_ms",
            format!("must be at least {MIN_SCAN_INTERVAL_MS}"),
        ));
    }
    for token in &statics.serve.precompressed.prefer {
        if Encoding::from_token(token).is_none() {
            errors.push(ValidationError::new(
                "static_files.serve.precompressed.prefer",
                format!("unsupported encoding: {token}"),
            ));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {}", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_static_section_checks() {
        let mut config = ServerConfig::default();
        config.static_files.enabled = true;
        config.static_files.root_dir = PathBuf::new();
        config.static_files.max_files = Some(0);
        config.static_files.scan_interval_ms = Some(10);
        config.static_files.serve.precompressed.prefer = vec!["br".into(), "zstd".into()];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "static_files.root_dir",
                "static_files.max_files",
                "static_files.scan_interval_ms",
                "static_files.serve.precompressed.prefer",
            ]
        );
    }

    #[test]
    fn test_addresses_must_parse() {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "localhost".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nope".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].to_string(), "listener.bind_address: not a socket address: localhost");
    }
}
