//! Client IP allow-list and client address resolution.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::HeaderMap;

use crate::error::AdmissionError;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolve the client address.
///
/// With `trust_proxy`, the right-most `X-Forwarded-For` hop wins (the one
/// appended by our own proxy); otherwise the socket peer is used.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        let forwarded = headers
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').next())
            .and_then(|hop| hop.trim().parse().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }
    peer
}

/// Set of addresses permitted to call the API. Empty means unrestricted.
pub struct IpAllowList {
    allowed: ArcSwap<HashSet<IpAddr>>,
    enforce: bool,
}

impl IpAllowList {
    /// `enforce = false` turns the check off entirely (development mode).
    pub fn new(allowed: impl IntoIterator<Item = IpAddr>, enforce: bool) -> Self {
        Self {
            allowed: ArcSwap::from_pointee(allowed.into_iter().collect()),
            enforce,
        }
    }

    pub fn check(&self, ip: Option<IpAddr>) -> Result<(), AdmissionError> {
        if !self.enforce {
            return Ok(());
        }
        let allowed = self.allowed.load();
        if allowed.is_empty() {
            return Ok(());
        }
        match ip {
            Some(ip) if allowed.contains(&ip) || allowed.contains(&ip.to_canonical()) => Ok(()),
            other => {
                let ip = other.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".into());
                tracing::warn!(client_ip = %ip, "Blocked request from unauthorized IP");
                Err(AdmissionError::IpNotAllowed { ip })
            }
        }
    }

    pub fn replace(&self, allowed: impl IntoIterator<Item = IpAddr>) {
        let allowed: HashSet<IpAddr> = allowed.into_iter().collect();
        tracing::info!(count = allowed.len(), "IP allow-list replaced");
        self.allowed.store(Arc::new(allowed));
    }
}
