//! Conversion between raw request parts and the admission envelope.

use axum::http::{header, HeaderMap};
use serde_json::{Map, Value};

use crate::error::AdmissionError;

/// How the body was encoded, so it can be written back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Empty,
    Json,
    Form,
}

impl BodyKind {
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            BodyKind::Empty => None,
            BodyKind::Json => Some("application/json"),
            BodyKind::Form => Some("application/x-www-form-urlencoded"),
        }
    }
}

/// Decode a buffered body by its declared content type.
///
/// A body without a content type is read as JSON.
pub fn decode_body(headers: &HeaderMap, bytes: &[u8]) -> Result<(BodyKind, Value), AdmissionError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok((BodyKind::Empty, Value::Null));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase());

    match content_type.as_deref() {
        None | Some("application/json") => parse_json(bytes),
        Some(ct) if ct.ends_with("+json") => parse_json(bytes),
        Some("application/x-www-form-urlencoded") => {
            let raw = std::str::from_utf8(bytes)
                .map_err(|_| AdmissionError::malformed("form body is not UTF-8"))?;
            Ok((BodyKind::Form, Value::Object(parse_urlencoded(raw)?)))
        }
        Some(other) => Err(AdmissionError::malformed(format!(
            "unsupported content type {other}"
        ))),
    }
}

fn parse_json(bytes: &[u8]) -> Result<(BodyKind, Value), AdmissionError> {
    serde_json::from_slice(bytes)
        .map(|value| (BodyKind::Json, value))
        .map_err(|e| AdmissionError::malformed(format!("invalid JSON body: {e}")))
}

/// Encode the (possibly rewritten) body for the downstream handler.
pub fn encode_body(kind: BodyKind, body: &Value) -> Result<Vec<u8>, AdmissionError> {
    match (kind, body) {
        (BodyKind::Empty, _) => Ok(Vec::new()),
        (BodyKind::Form, Value::Object(map)) => Ok(encode_urlencoded(map).into_bytes()),
        _ => serde_json::to_vec(body)
            .map_err(|e| AdmissionError::Internal(format!("re-encoding body: {e}"))),
    }
}

/// Parse `a=1&b=2&a=3` into `{"a": ["1", "3"], "b": "2"}`.
pub fn parse_urlencoded(raw: &str) -> Result<Map<String, Value>, AdmissionError> {
    let mut map = Map::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key)?;
        let value = Value::String(decode_component(value)?);

        match map.get_mut(&key) {
            None => {
                map.insert(key, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Ok(map)
}

fn decode_component(raw: &str) -> Result<String, AdmissionError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|_| AdmissionError::malformed("invalid percent-encoding"))
}

/// Inverse of [`parse_urlencoded`]. Non-string scalars are written as JSON text.
pub fn encode_urlencoded(map: &Map<String, Value>) -> String {
    let mut pairs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let key = urlencoding::encode(key);
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push(format!("{}={}", key, urlencoding::encode(&scalar(item))));
                }
            }
            other => pairs.push(format!("{}={}", key, urlencoding::encode(&scalar(other)))),
        }
    }
    pairs.join("&")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn headers(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn test_repeated_query_keys_become_arrays() {
        let map = parse_urlencoded("q=team+sync&tag=a&tag=b&tag=c&empty").unwrap();
        assert_eq!(map["q"], json!("team sync"));
        assert_eq!(map["tag"], json!(["a", "b", "c"]));
        assert_eq!(map["empty"], json!(""));
    }

    #[test]
    fn test_bad_percent_encoding_is_malformed() {
        let err = parse_urlencoded("q=%FF%FE").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_INPUT");
    }

    #[test]
    fn test_decode_by_content_type() {
        let (kind, body) =
            decode_body(&headers("application/json; charset=utf-8"), br#"{"title":"x"}"#).unwrap();
        assert_eq!(kind, BodyKind::Json);
        assert_eq!(body, json!({"title": "x"}));

        let (kind, body) =
            decode_body(&headers("application/x-www-form-urlencoded"), b"title=Stand+up").unwrap();
        assert_eq!(kind, BodyKind::Form);
        assert_eq!(body, json!({"title": "Stand up"}));

        let (kind, body) = decode_body(&HeaderMap::new(), b"").unwrap();
        assert_eq!(kind, BodyKind::Empty);
        assert_eq!(body, Value::Null);
    }

    #[test]
    fn test_unsupported_or_invalid_bodies_are_malformed() {
        let err = decode_body(&headers("text/plain"), b"hello").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_INPUT");

        let err = decode_body(&headers("application/json"), b"{not json").unwrap_err();
        assert_eq!(err.code(), "MALFORMED_INPUT");
    }

    #[test]
    fn test_encode_keeps_form_shape() {
        let map = parse_urlencoded("title=a%26b&tag=x&tag=y").unwrap();
        let encoded = encode_urlencoded(&map);
        assert_eq!(parse_urlencoded(&encoded).unwrap(), map);

        let bytes = encode_body(BodyKind::Json, &json!({"n": 1})).unwrap();
        assert_eq!(bytes, br#"{"n":1}"#);
        assert!(encode_body(BodyKind::Empty, &Value::Null).unwrap().is_empty());
    }
}
