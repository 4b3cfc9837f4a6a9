//! Construction of the shared admission components from configuration.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::config::loader::ConfigError;
use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::error::RateLimitScope;
use crate::pipeline::stages::{
    AuditStage, AuthenticateStage, InjectionStage, IpAllowListStage, IpRateLimitStage,
    KeyRateLimitStage, PayloadStage, SanitizeStage,
};
use crate::pipeline::AdmissionPipeline;
use crate::security::access_control::IpAllowList;
use crate::security::clock::{Clock, SystemClock};
use crate::security::injection::InjectionRules;
use crate::security::keystore::KeyStore;
use crate::security::limits::{PayloadGuard, PayloadLimits};
use crate::security::rate_limit::{
    FixedWindow, FixedWindowLimiter, RatePolicy, SlidingWindow, SlidingWindowLimiter,
};
use crate::security::sanitize::Sanitizer;
use crate::security::store::BoundedStore;

/// Process-wide admission state, shared by every pipeline.
pub struct AdmissionComponents {
    pub ip_allow_list: Arc<IpAllowList>,
    pub ip_limiter: Arc<FixedWindowLimiter>,
    pub payload_guard: Arc<PayloadGuard>,
    pub sanitizer: Arc<Sanitizer>,
    pub injection_rules: Arc<InjectionRules>,
    pub key_store: Arc<KeyStore>,
    pub key_limiter: Arc<SlidingWindowLimiter>,
    write_methods: Vec<Method>,
    ip_rate_limit_enabled: bool,
    key_rate_limit_enabled: bool,
    injection_enabled: bool,
}

impl AdmissionComponents {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &GatewayConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let max_entries = config.rate_limit_store.max_entries;
        let ip_limiter = FixedWindowLimiter::new(
            RateLimitScope::Ip,
            RatePolicy::new(
                config.ip_rate_limit.max_requests,
                Duration::from_secs(config.ip_rate_limit.window_secs),
            ),
            Arc::new(BoundedStore::<FixedWindow>::new(max_entries)),
            clock.clone(),
        );
        let key_limiter = SlidingWindowLimiter::new(
            RateLimitScope::ApiKey,
            RatePolicy::new(
                config.key_rate_limit.max_requests,
                Duration::from_secs(config.key_rate_limit.window_secs),
            ),
            Arc::new(BoundedStore::<SlidingWindow>::new(max_entries)),
            clock,
        );

        let payload = &config.payload;
        let payload_guard = PayloadGuard::new(PayloadLimits {
            max_body_bytes: payload.max_body_bytes,
            max_query_params: payload.max_query_params,
            max_string_length: payload.max_string_length,
            max_depth: payload.max_depth,
        });

        Ok(Self {
            ip_allow_list: Arc::new(IpAllowList::new(
                parse_ips(&config.access.allowed_ips),
                !config.is_development(),
            )),
            ip_limiter: Arc::new(ip_limiter),
            payload_guard: Arc::new(payload_guard),
            sanitizer: Arc::new(Sanitizer::new(payload.max_depth)),
            injection_rules: Arc::new(build_rules(config)?),
            key_store: Arc::new(KeyStore::new(config.auth.api_keys.iter().cloned())),
            key_limiter: Arc::new(key_limiter),
            write_methods: config
                .injection
                .write_methods
                .iter()
                .filter_map(|m| Method::from_bytes(m.to_uppercase().as_bytes()).ok())
                .collect(),
            ip_rate_limit_enabled: config.ip_rate_limit.enabled,
            key_rate_limit_enabled: config.key_rate_limit.enabled,
            injection_enabled: config.injection.enabled,
        })
    }

    /// Unauthenticated checks shared by every admitted route.
    fn pre_auth(&self) -> AdmissionPipeline {
        let mut pipeline =
            AdmissionPipeline::new().with_stage(IpAllowListStage(self.ip_allow_list.clone()));
        if self.ip_rate_limit_enabled {
            pipeline = pipeline.with_stage(IpRateLimitStage(self.ip_limiter.clone()));
        }
        pipeline = pipeline
            .with_stage(PayloadStage(self.payload_guard.clone()))
            .with_stage(SanitizeStage(self.sanitizer.clone()));
        if self.injection_enabled {
            pipeline = pipeline.with_stage(InjectionStage {
                rules: self.injection_rules.clone(),
                write_methods: self.write_methods.clone(),
            });
        }
        pipeline
    }

    /// Full pipeline for `/api` routes.
    pub fn api_pipeline(&self) -> AdmissionPipeline {
        let mut pipeline = self
            .pre_auth()
            .with_stage(AuthenticateStage(self.key_store.clone()));
        if self.key_rate_limit_enabled {
            pipeline = pipeline.with_stage(KeyRateLimitStage(self.key_limiter.clone()));
        }
        pipeline.with_stage(AuditStage)
    }

    /// Pipeline for public routes: no credential required.
    pub fn public_pipeline(&self) -> AdmissionPipeline {
        self.pre_auth().with_stage(AuditStage)
    }

    /// Swap the hot-reloadable parts of a new configuration in.
    pub fn apply_reload(&self, config: &GatewayConfig) {
        self.key_store.replace_keys(config.auth.api_keys.iter().cloned());
        self.ip_allow_list.replace(parse_ips(&config.access.allowed_ips));
    }

    /// Drop idle rate-limit entries from both limiters.
    pub fn sweep(&self) -> usize {
        self.ip_limiter.sweep() + self.key_limiter.sweep()
    }

    /// How often [`sweep`](Self::sweep) is worth running.
    pub fn sweep_interval(&self) -> Duration {
        self.ip_limiter
            .policy()
            .window
            .min(self.key_limiter.policy().window)
            .max(Duration::from_secs(1))
    }
}

fn parse_ips(raw: &[String]) -> Vec<IpAddr> {
    raw.iter().filter_map(|ip| ip.trim().parse().ok()).collect()
}

fn build_rules(config: &GatewayConfig) -> Result<InjectionRules, ConfigError> {
    let injection = &config.injection;
    let mut rules = InjectionRules::new(config.payload.max_depth)
        .with_exempt_terms(injection.exempt_terms.iter());
    for name in &injection.disabled_rules {
        rules = rules.without_rule(name);
    }
    for custom in &injection.extra_rules {
        rules = rules.with_rule(custom.name.clone(), &custom.pattern).map_err(|e| {
            ConfigError::Validation(vec![ValidationError::new(
                "injection.extra_rules",
                format!("rule '{}' does not compile: {}", custom.name, e),
            )])
        })?;
    }
    Ok(rules)
}
