//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every backend group is non-empty and well-formed
//! - Validate value ranges (rates, attempts, timeouts > 0, error threshold 1..=3)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{GroupConfig, RelayConfig};
use crate::load_balancer::backend::Backend;

/// Three errors always disable a backend; a lower threshold only disables it sooner.
pub const MAX_UNHEALTHY_THRESHOLD: u32 = 3;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_group("load_balancer1", &config.load_balancer1, &mut errors);
    validate_group("load_balancer2", &config.load_balancer2, &mut errors);

    if !(config.source.request_rate.is_finite() && config.source.request_rate > 0.0) {
        errors.push(ValidationError::new("source.request_rate", "must be a positive number"));
    }
    if config.transport.timeout_secs == 0 {
        errors.push(ValidationError::new("transport.timeout_secs", "must be greater than 0"));
    }
    if config.transport.connect_attempts == 0 {
        errors.push(ValidationError::new("transport.connect_attempts", "must be at least 1"));
    }
    if !(1..=MAX_UNHEALTHY_THRESHOLD).contains(&config.health_check.unhealthy_threshold) {
        errors.push(ValidationError::new(
            "health_check.unhealthy_threshold",
            format!("must be between 1 and {}", MAX_UNHEALTHY_THRESHOLD),
        ));
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be at least 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_group(name: &str, group: &GroupConfig, errors: &mut Vec<ValidationError>) {
    let field = format!("{}.services", name);
    if group.services.is_empty() {
        errors.push(ValidationError::new(&field, "at least one backend is required"));
        return;
    }

    let mut seen = HashSet::new();
    for service in &group.services {
        if let Err(e) = service.parse::<Backend>() {
            errors.push(ValidationError::new(&field, e.to_string()));
        } else if !seen.insert(service.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate backend '{}'", service)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.load_balancer1.services = vec!["127.0.0.1:8083".into(), "127.0.0.1:8084".into()];
        config.load_balancer2.services = vec!["service-b:8085".into()];
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.load_balancer1.services.push("127.0.0.1:8083".into());
        config.load_balancer2.services = vec!["no-port".into()];
        config.source.request_rate = 0.0;
        config.transport.connect_attempts = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
        assert!(errors.iter().any(|e| e.field == "transport.connect_attempts"));
    }

    #[test]
    fn threshold_cannot_exceed_three_errors() {
        let mut config = valid();
        config.health_check.unhealthy_threshold = 4;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "health_check.unhealthy_threshold");

        config.health_check.unhealthy_threshold = 0;
        assert!(validate_config(&config).is_err());

        config.health_check.unhealthy_threshold = 2;
        assert!(validate_config(&config).is_ok());
    }
}
