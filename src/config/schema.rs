//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::security::injection::DEFAULT_EXEMPT_TERMS;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deployment environment.
    pub environment: Environment,

    /// API key allow-list.
    pub auth: AuthConfig,

    /// Network-level access control (IP allow-list, proxies, CORS).
    pub access: AccessConfig,

    /// Pre-auth fixed-window limit keyed by client IP.
    pub ip_rate_limit: RateLimitConfig,

    /// Post-auth sliding-window limit keyed by API key.
    pub key_rate_limit: RateLimitConfig,

    /// Rate-limit state storage.
    pub rate_limit_store: StoreConfig,

    /// Request size and shape limits.
    pub payload: PayloadConfig,

    /// SQL-injection heuristics.
    pub injection: InjectionConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// IP allow-list disabled, debug detail in error responses.
    Development,
    #[default]
    Production,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Valid API keys. Empty means every `/api` request is rejected.
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Client IPs allowed to connect. Empty means unrestricted.
    pub allowed_ips: Vec<String>,

    /// Take the client IP from the last `X-Forwarded-For` hop.
    pub trust_proxy: bool,

    /// CORS origins.
    pub allowed_origins: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allowed_ips: Vec::new(),
            trust_proxy: false,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Include this limiter in the pipeline.
    pub enabled: bool,

    /// Requests allowed per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 50,
            window_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keys tracked per limiter before least-recently-used eviction.
    pub max_entries: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Ceiling on the serialized body, in bytes.
    pub max_body_bytes: usize,

    /// Maximum distinct query parameter names.
    pub max_query_params: usize,

    /// Maximum characters in any string value.
    pub max_string_length: usize,

    /// Maximum nesting depth of body values.
    pub max_depth: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            max_query_params: 50,
            max_string_length: 10_000,
            max_depth: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// Include the injection scan in the pipeline.
    pub enabled: bool,

    /// Methods that get scanned.
    pub write_methods: Vec<String>,

    /// Whole values never scanned (case-insensitive).
    pub exempt_terms: Vec<String>,

    /// Built-in rule names to turn off.
    pub disabled_rules: Vec<String>,

    /// Additional rules, evaluated after the built-in ones.
    pub extra_rules: Vec<CustomRuleConfig>,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            write_methods: vec!["POST".into(), "PUT".into(), "PATCH".into()],
            exempt_terms: DEFAULT_EXEMPT_TERMS.iter().map(|t| t.to_string()).collect(),
            disabled_rules: Vec::new(),
            extra_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomRuleConfig {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time for request/response in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
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
    /// Log level (trace, debug, info, warn, error) when RUST_LOG is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = GatewayConfig::default();
        assert_eq!(config.key_rate_limit.max_requests, 50);
        assert_eq!(config.key_rate_limit.window_secs, 900);
        assert_eq!(config.ip_rate_limit.max_requests, 50);
        assert_eq!(config.payload.max_body_bytes, 1_048_576);
        assert_eq!(config.payload.max_query_params, 50);
        assert_eq!(config.payload.max_string_length, 10_000);
        assert_eq!(config.environment, Environment::Production);
        assert!(config.injection.exempt_terms.iter().any(|t| t == "meeting"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            environment = "development"

            [auth]
            api_keys = ["k1"]

            [key_rate_limit]
            max_requests = 5

            [[injection.extra_rules]]
            name = "sleep_call"
            pattern = 'sleep\('
            "#,
        )
        .unwrap();

        assert!(config.is_development());
        assert_eq!(config.auth.api_keys, vec!["k1"]);
        assert_eq!(config.key_rate_limit.max_requests, 5);
        assert_eq!(config.key_rate_limit.window_secs, 900);
        assert!(config.key_rate_limit.enabled);
        assert_eq!(config.injection.extra_rules[0].name, "sleep_call");
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
    }
}
