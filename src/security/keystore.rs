//! API key authentication.
//!
//! Credentials come from `X-API-Key` or `Authorization: Bearer <token>`;
//! the header wins when both are present. The allow-list lives behind an
//! `ArcSwap` so a config reload can rotate keys without a restart.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::{header, HeaderMap};

use crate::error::AdmissionError;

pub const X_API_KEY: &str = "x-api-key";

/// An authenticated caller, represented by its API key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters followed by `***`, for logs.
    pub fn masked(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{prefix}***")
    }
}

// Never print the full key.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.masked()).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Pull the presented credential out of the request headers.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(X_API_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(key) = from_header {
        return Some(key.to_string());
    }

    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = auth.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

/// Allow-list of valid API keys.
pub struct KeyStore {
    keys: ArcSwap<HashSet<String>>,
}

impl KeyStore {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: ArcSwap::from_pointee(collect_keys(keys)),
        }
    }

    pub fn authenticate(&self, candidate: Option<&str>) -> Result<Identity, AdmissionError> {
        let candidate = candidate.ok_or(AdmissionError::MissingCredential)?;
        if self.keys.load().contains(candidate) {
            Ok(Identity(candidate.to_string()))
        } else {
            Err(AdmissionError::InvalidCredential)
        }
    }

    /// Atomically replace the allow-list.
    pub fn replace_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = collect_keys(keys);
        tracing::info!(count = keys.len(), "API key allow-list replaced");
        self.keys.store(Arc::new(keys));
    }

    pub fn len(&self) -> usize {
        self.keys.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_keys<I, S>(keys: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    keys.into_iter()
        .map(Into::into)
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_takes_precedence_over_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(X_API_KEY, HeaderValue::from_static("from-header"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_bearer_token_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc123"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_credential(&headers), None);
    }

    #[test]
    fn test_empty_header_falls_back_to_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(X_API_KEY, HeaderValue::from_static(""));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("tok"));
    }

    #[test]
    fn test_authenticate() {
        let store = KeyStore::new(["key-one", "key-two"]);

        assert_eq!(store.authenticate(None), Err(AdmissionError::MissingCredential));
        assert_eq!(store.authenticate(Some("nope")), Err(AdmissionError::InvalidCredential));
        let identity = store.authenticate(Some("key-two")).unwrap();
        assert_eq!(identity.as_str(), "key-two");
    }

    #[test]
    fn test_replace_keys_rotates_allow_list() {
        let store = KeyStore::new(["old"]);
        store.replace_keys(["new"]);

        assert!(store.authenticate(Some("old")).is_err());
        assert!(store.authenticate(Some("new")).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_identity_masks_key() {
        let store = KeyStore::new(["0123456789abcdef"]);
        let identity = store.authenticate(Some("0123456789abcdef")).unwrap();
        assert_eq!(identity.masked(), "01234567***");
        assert!(!format!("{identity:?}").contains("89abcdef"));
    }
}
