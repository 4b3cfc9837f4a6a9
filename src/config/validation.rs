//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits and windows > 0)
//! - Check that addresses, origins, methods and rule patterns parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, including on reload

use std::net::{IpAddr, SocketAddr};

use axum::http::{HeaderValue, Method};
use regex::Regex;

use crate::config::schema::{GatewayConfig, RateLimitConfig};
use crate::security::injection::BUILTIN_RULES;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Longest accepted rate-limit window (one day).
pub const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    check_rate_limit("ip_rate_limit", &config.ip_rate_limit, &mut errors);
    check_rate_limit("key_rate_limit", &config.key_rate_limit, &mut errors);

    if config.rate_limit_store.max_entries == 0 {
        errors.push(ValidationError::new("rate_limit_store.max_entries", "must be greater than 0"));
    }

    let payload = &config.payload;
    for (field, value) in [
        ("payload.max_body_bytes", payload.max_body_bytes),
        ("payload.max_query_params", payload.max_query_params),
        ("payload.max_string_length", payload.max_string_length),
        ("payload.max_depth", payload.max_depth),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    for ip in &config.access.allowed_ips {
        if ip.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                "access.allowed_ips",
                format!("'{ip}' is not an IP address"),
            ));
        }
    }

    for origin in &config.access.allowed_origins {
        if origin == "*" {
            errors.push(ValidationError::new(
                "access.allowed_origins",
                "wildcard origin cannot be combined with credentials",
            ));
        } else if HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "access.allowed_origins",
                format!("'{origin}' is not a valid origin"),
            ));
        }
    }

    for method in &config.injection.write_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "injection.write_methods",
                format!("'{method}' is not an HTTP method"),
            ));
        }
    }

    for name in &config.injection.disabled_rules {
        if !BUILTIN_RULES.iter().any(|(builtin, _)| builtin == name) {
            errors.push(ValidationError::new(
                "injection.disabled_rules",
                format!("unknown rule '{name}'"),
            ));
        }
    }

    for rule in &config.injection.extra_rules {
        if rule.name.trim().is_empty() {
            errors.push(ValidationError::new("injection.extra_rules", "rule name is empty"));
        }
        if let Err(e) = Regex::new(&rule.pattern) {
            errors.push(ValidationError::new(
                "injection.extra_rules",
                format!("rule '{}' does not compile: {}", rule.name, e),
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let level = config.observability.log_level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {:?}", config.observability.log_level, LOG_LEVELS),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rate_limit(section: &str, limit: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if !limit.enabled {
        return;
    }
    if limit.max_requests == 0 {
        errors.push(ValidationError::new(
            format!("{section}.max_requests"),
            "must be greater than 0",
        ));
    }
    if limit.window_secs == 0 {
        errors.push(ValidationError::new(
            format!("{section}.window_secs"),
            "must be greater than 0",
        ));
    } else if limit.window_secs > MAX_WINDOW_SECS {
        errors.push(ValidationError::new(
            format!("{section}.window_secs"),
            format!("must be at most {MAX_WINDOW_SECS}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::CustomRuleConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.key_rate_limit.max_requests = 0;
        config.payload.max_body_bytes = 0;
        config.access.allowed_ips = vec!["10.0.0.1".into(), "nope".into()];
        config.access.allowed_origins = vec!["*".into()];
        config.injection.write_methods = vec!["PO ST".into()];
        config.injection.disabled_rules = vec!["no_such_rule".into()];
        config.injection.extra_rules = vec![CustomRuleConfig {
            name: "broken".into(),
            pattern: "(unclosed".into(),
        }];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "key_rate_limit.max_requests",
                "payload.max_body_bytes",
                "access.allowed_ips",
                "access.allowed_origins",
                "injection.write_methods",
                "injection.disabled_rules",
                "injection.extra_rules",
            ]
        );
    }

    #[test]
    fn test_window_upper_bound() {
        let mut config = GatewayConfig::default();
        config.key_rate_limit.window_secs = MAX_WINDOW_SECS;
        assert!(validate_config(&config).is_ok());

        config.key_rate_limit.window_secs = u64::MAX;
        config.ip_rate_limit.window_secs = MAX_WINDOW_SECS + 1;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["ip_rate_limit.window_secs", "key_rate_limit.window_secs"]);
    }

    #[test]
    fn test_disabled_limiter_skips_range_checks() {
        let mut config = GatewayConfig::default();
        config.ip_rate_limit.enabled = false;
        config.ip_rate_limit.max_requests = 0;
        assert!(validate_config(&config).is_ok());
    }
}
