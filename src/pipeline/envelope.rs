//! Per-request data carried through the admission stages.

use std::net::IpAddr;

use axum::http::{HeaderMap, Method};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AdmissionError;
use crate::http::request::RequestId;
use crate::security::keystore::Identity;

/// Body, query and path parameters of one request.
///
/// Stages mutate this in place; the HTTP layer re-serializes it before the
/// request reaches the downstream router.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestEnvelope {
    /// Parsed body, `Null` when the request had none.
    pub body: Value,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
}

impl RequestEnvelope {
    pub fn new(body: Value, query: Map<String, Value>, params: Map<String, Value>) -> Self {
        Self { body, query, params }
    }

    /// Visit every string leaf of body, query and params.
    pub fn visit_strings<F>(&self, max_depth: usize, mut visit: F) -> Result<(), AdmissionError>
    where
        F: FnMut(&str, &str) -> Result<(), AdmissionError>,
    {
        let mut path = String::from("body");
        walk(&self.body, &mut path, 0, max_depth, &mut visit)?;
        for (name, section) in [("query", &self.query), ("params", &self.params)] {
            let mut path = String::from(name);
            walk_map(section, &mut path, 0, max_depth, &mut visit)?;
        }
        Ok(())
    }

    /// Rewrite every string leaf of body, query and params. Keys are kept.
    pub fn rewrite_strings<F>(&mut self, max_depth: usize, mut rewrite: F) -> Result<(), AdmissionError>
    where
        F: FnMut(&str) -> String,
    {
        walk_mut(&mut self.body, 0, max_depth, &mut rewrite)?;
        for section in [&mut self.query, &mut self.params] {
            for value in section.values_mut() {
                walk_mut(value, 1, max_depth, &mut rewrite)?;
            }
        }
        Ok(())
    }
}

fn too_deep(max_depth: usize) -> AdmissionError {
    AdmissionError::malformed(format!("nesting deeper than {max_depth} levels"))
}

fn walk<F>(value: &Value, path: &mut String, depth: usize, max_depth: usize, visit: &mut F) -> Result<(), AdmissionError>
where
    F: FnMut(&str, &str) -> Result<(), AdmissionError>,
{
    if depth > max_depth {
        return Err(too_deep(max_depth));
    }
    match value {
        Value::String(s) => visit(path, s),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let len = path.len();
                path.push_str(&format!("[{i}]"));
                walk(item, path, depth + 1, max_depth, visit)?;
                path.truncate(len);
            }
            Ok(())
        }
        Value::Object(map) => walk_map(map, path, depth, max_depth, visit),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
    }
}

fn walk_map<F>(
    map: &Map<String, Value>,
    path: &mut String,
    depth: usize,
    max_depth: usize,
    visit: &mut F,
) -> Result<(), AdmissionError>
where
    F: FnMut(&str, &str) -> Result<(), AdmissionError>,
{
    for (key, item) in map {
        let len = path.len();
        path.push('.');
        path.push_str(key);
        walk(item, path, depth + 1, max_depth, visit)?;
        path.truncate(len);
    }
    Ok(())
}

fn walk_mut<F>(value: &mut Value, depth: usize, max_depth: usize, rewrite: &mut F) -> Result<(), AdmissionError>
where
    F: FnMut(&str) -> String,
{
    if depth > max_depth {
        return Err(too_deep(max_depth));
    }
    match value {
        Value::String(s) => {
            *s = rewrite(s);
            Ok(())
        }
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| walk_mut(item, depth + 1, max_depth, rewrite)),
        Value::Object(map) => map
            .values_mut()
            .try_for_each(|item| walk_mut(item, depth + 1, max_depth, rewrite)),
        Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
    }
}

/// Correlation data for one request, created before any stage runs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub method: Method,
    pub path: String,
    pub client_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn is_write(&self, write_methods: &[Method]) -> bool {
        write_methods.contains(&self.method)
    }

    pub fn client_ip_label(&self) -> String {
        self.client_ip
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Everything a stage may look at or change.
#[derive(Debug)]
pub struct Inbound {
    pub context: RequestContext,
    pub headers: HeaderMap,
    pub envelope: RequestEnvelope,
    /// Body or query that could not be decoded. Reported by the payload
    /// stage so that earlier stages still run first.
    pub decode_error: Option<AdmissionError>,
    /// Set by the authentication stage.
    pub identity: Option<Identity>,
}

/// A request that cleared every stage.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub context: RequestContext,
    pub envelope: RequestEnvelope,
    /// `None` on routes whose pipeline does not authenticate.
    pub identity: Option<Identity>,
}
