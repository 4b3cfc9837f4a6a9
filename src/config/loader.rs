//! Configuration loading from disk and environment.
//!
//! Precedence: defaults < TOML file < environment variables.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::{Environment, GatewayConfig, LogFormat};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config = read_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load from an optional file, apply process environment overrides, validate.
pub fn load(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    load_with(path, |var| std::env::var(var).ok())
}

/// Like [`load`], with an injectable environment lookup.
pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => GatewayConfig::default(),
    };
    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Overlay environment variables onto `config`.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = parse_var::<u16, _>(&lookup, "PORT")? {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{host}:{port}");
    }

    if let Some(env) = lookup("APP_ENV") {
        config.environment = match env.trim().to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "production" | "prod" => Environment::Production,
            _ => return Err(ConfigError::Env { var: "APP_ENV", value: env }),
        };
    }

    if let Some(keys) = lookup("VALID_API_KEYS") {
        config.auth.api_keys = split_list(&keys);
    }
    if let Some(ips) = lookup("ALLOWED_IPS") {
        config.access.allowed_ips = split_list(&ips);
    }
    if let Some(origins) = lookup("ALLOWED_ORIGINS") {
        config.access.allowed_origins = split_list(&origins);
    }
    if let Some(trust) = parse_bool(&lookup, "TRUST_PROXY")? {
        config.access.trust_proxy = trust;
    }

    if let Some(v) = parse_var(&lookup, "RATE_LIMIT_WINDOW_SECS")? {
        config.key_rate_limit.window_secs = v;
    }
    if let Some(v) = parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS")? {
        config.key_rate_limit.max_requests = v;
    }
    if let Some(v) = parse_var(&lookup, "IP_RATE_LIMIT_WINDOW_SECS")? {
        config.ip_rate_limit.window_secs = v;
    }
    if let Some(v) = parse_var(&lookup, "IP_RATE_LIMIT_MAX_REQUESTS")? {
        config.ip_rate_limit.max_requests = v;
    }
    if let Some(v) = parse_var(&lookup, "RATE_LIMIT_MAX_ENTRIES")? {
        config.rate_limit_store.max_entries = v;
    }

    if let Some(v) = parse_var(&lookup, "MAX_BODY_BYTES")? {
        config.payload.max_body_bytes = v;
    }
    if let Some(v) = parse_var(&lookup, "MAX_QUERY_PARAMS")? {
        config.payload.max_query_params = v;
    }
    if let Some(v) = parse_var(&lookup, "MAX_STRING_LENGTH")? {
        config.payload.max_string_length = v;
    }

    if let Some(level) = lookup("LOG_LEVEL") {
        config.observability.log_level = level.trim().to_string();
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.observability.log_format = match format.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => return Err(ConfigError::Env { var: "LOG_FORMAT", value: format }),
        };
    }

    Ok(())
}

/// Comma-separated list, trimmed, empty items dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::Env { var, value }),
        },
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::Env { var, value }),
        },
    }
}
