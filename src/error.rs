//! Admission error taxonomy.
//!
//! Every stage of the admission pipeline reports failure as an
//! [`AdmissionError`]. The HTTP layer turns it into the uniform rejection
//! envelope; nothing in here knows about JSON.

use std::time::Duration;

use axum::http::StatusCode;

/// Which limiter produced a `RateLimited` rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Pre-auth fixed-window limiter keyed by client IP.
    Ip,
    /// Post-auth sliding-window limiter keyed by API key.
    ApiKey,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Ip => "ip",
            RateLimitScope::ApiKey => "api_key",
        }
    }
}

/// Reason a request was refused admission.
///
/// `Display` output is for server-side logs and may contain request-derived
/// detail. Use [`AdmissionError::public_message`] for anything sent to the
/// caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmissionError {
    #[error("no API key presented")]
    MissingCredential,

    #[error("API key not in allow-list")]
    InvalidCredential,

    #[error("client ip {ip} not in allow-list")]
    IpNotAllowed { ip: String },

    #[error("{} rate limit of {limit} per {window:?} exceeded, retry after {retry_after:?}", scope.as_str())]
    RateLimited {
        scope: RateLimitScope,
        limit: u32,
        window: Duration,
        retry_after: Duration,
    },

    #[error("serialized body is {size} bytes, ceiling is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{count} query parameters, maximum is {limit}")]
    TooManyParameters { count: usize, limit: usize },

    #[error("string at {path} has {length} characters, maximum is {limit}")]
    StringTooLong {
        path: String,
        length: usize,
        limit: usize,
    },

    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("rule {rule} matched value at {path}")]
    SuspiciousContent { rule: String, path: String },

    #[error("internal fault: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Stable machine-readable code placed in the rejection envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::MissingCredential => "MISSING_CREDENTIAL",
            AdmissionError::InvalidCredential => "INVALID_CREDENTIAL",
            AdmissionError::IpNotAllowed { .. } => "IP_NOT_ALLOWED",
            AdmissionError::RateLimited { .. } => "RATE_LIMITED",
            AdmissionError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AdmissionError::TooManyParameters { .. } => "TOO_MANY_PARAMETERS",
            AdmissionError::StringTooLong { .. } => "STRING_TOO_LONG",
            AdmissionError::MalformedInput { .. } => "MALFORMED_INPUT",
            AdmissionError::SuspiciousContent { .. } => "SUSPICIOUS_CONTENT",
            AdmissionError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AdmissionError::MissingCredential | AdmissionError::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            }
            AdmissionError::IpNotAllowed { .. } => StatusCode::FORBIDDEN,
            AdmissionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AdmissionError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AdmissionError::TooManyParameters { .. }
            | AdmissionError::StringTooLong { .. }
            | AdmissionError::MalformedInput { .. }
            | AdmissionError::SuspiciousContent { .. } => StatusCode::BAD_REQUEST,
            AdmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message. Never contains request content.
    pub fn public_message(&self) -> String {
        match self {
            AdmissionError::MissingCredential => {
                "Please provide a valid API key in X-API-Key header or Authorization Bearer token"
                    .to_string()
            }
            AdmissionError::InvalidCredential => "The provided API key is not valid".to_string(),
            AdmissionError::IpNotAllowed { .. } => {
                "Your IP address is not authorized to access this API".to_string()
            }
            AdmissionError::RateLimited {
                scope: RateLimitScope::Ip,
                ..
            } => "Too many requests from this IP, please try again later.".to_string(),
            AdmissionError::RateLimited {
                scope: RateLimitScope::ApiKey,
                limit,
                window,
                ..
            } => format!(
                "API key rate limit exceeded. Maximum {} requests per {} minutes.",
                limit,
                window.as_secs().div_ceil(60)
            ),
            AdmissionError::PayloadTooLarge { .. } => {
                "Request body exceeds maximum allowed size".to_string()
            }
            AdmissionError::TooManyParameters { .. } => {
                "Request contains too many query parameters".to_string()
            }
            AdmissionError::StringTooLong { .. } => {
                "Request contains strings that exceed maximum length".to_string()
            }
            AdmissionError::MalformedInput { .. } => {
                "Request contains invalid or potentially dangerous content".to_string()
            }
            AdmissionError::SuspiciousContent { .. } => {
                "Request contains potentially malicious content".to_string()
            }
            AdmissionError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Whole seconds until a retry may succeed, rounded up and never zero.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AdmissionError::RateLimited { retry_after, .. } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        AdmissionError::MalformedInput {
            reason: reason.into(),
        }
    }
}
