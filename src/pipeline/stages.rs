//! Stage adapters wrapping the security components.

use std::sync::Arc;

use axum::http::{header, Method};

use crate::error::AdmissionError;
use crate::pipeline::{Inbound, Stage};
use crate::security::access_control::IpAllowList;
use crate::security::injection::InjectionRules;
use crate::security::keystore::{extract_credential, KeyStore};
use crate::security::limits::PayloadGuard;
use crate::security::rate_limit::{FixedWindowLimiter, SlidingWindowLimiter};
use crate::security::sanitize::Sanitizer;

pub struct IpAllowListStage(pub Arc<IpAllowList>);

impl Stage for IpAllowListStage {
    fn name(&self) -> &'static str {
        "ip_allow_list"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        self.0.check(inbound.context.client_ip)
    }
}

pub struct IpRateLimitStage(pub Arc<FixedWindowLimiter>);

impl Stage for IpRateLimitStage {
    fn name(&self) -> &'static str {
        "ip_rate_limit"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        self.0.check(&inbound.context.client_ip_label())
    }
}

pub struct PayloadStage(pub Arc<PayloadGuard>);

impl Stage for PayloadStage {
    fn name(&self) -> &'static str {
        "payload_guard"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        if let Some(error) = inbound.decode_error.take() {
            return Err(error);
        }
        self.0.check(&inbound.envelope)
    }
}

pub struct SanitizeStage(pub Arc<Sanitizer>);

impl Stage for SanitizeStage {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        self.0.sanitize(&mut inbound.envelope)
    }
}

/// Injection scan, skipped for methods outside `write_methods`.
pub struct InjectionStage {
    pub rules: Arc<InjectionRules>,
    pub write_methods: Vec<Method>,
}

impl Stage for InjectionStage {
    fn name(&self) -> &'static str {
        "injection"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        if !inbound.context.is_write(&self.write_methods) {
            return Ok(());
        }
        let result = self.rules.detect(&inbound.envelope);
        if let Err(AdmissionError::SuspiciousContent { rule, path }) = &result {
            let payload = serde_json::to_string(&inbound.envelope).unwrap_or_default();
            tracing::warn!(
                request_id = %inbound.context.request_id,
                client_ip = %inbound.context.client_ip_label(),
                rule = %rule,
                field = %path,
                payload = %payload,
                "Potential SQL injection attempt"
            );
        }
        result
    }
}

pub struct AuthenticateStage(pub Arc<KeyStore>);

impl Stage for AuthenticateStage {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        let candidate = extract_credential(&inbound.headers);
        let identity = self.0.authenticate(candidate.as_deref())?;
        inbound.identity = Some(identity);
        Ok(())
    }
}

pub struct KeyRateLimitStage(pub Arc<SlidingWindowLimiter>);

impl Stage for KeyRateLimitStage {
    fn name(&self) -> &'static str {
        "key_rate_limit"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        match &inbound.identity {
            Some(identity) => self.0.check(identity.as_str()),
            None => Err(AdmissionError::Internal(
                "key rate limit evaluated before authentication".into(),
            )),
        }
    }
}

/// Security audit log line. Never rejects.
pub struct AuditStage;

impl Stage for AuditStage {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError> {
        let api_key = inbound
            .identity
            .as_ref()
            .map(|identity| identity.masked())
            .unwrap_or_else(|| "-".to_string());
        let user_agent = inbound
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info!(
            target: "security_audit",
            request_id = %inbound.context.request_id,
            client_ip = %inbound.context.client_ip_label(),
            api_key = %api_key,
            method = %inbound.context.method,
            path = %inbound.context.path,
            user_agent = %user_agent,
            "Request admitted"
        );
        Ok(())
    }
}
