//! Calendar API security gateway library.
//!
//! Admission control in front of a calendar/task HTTP API: every request
//! passes an ordered pipeline of checks (IP allow-list, rate limits, payload
//! limits, sanitization, injection heuristics, API key authentication, audit)
//! before the downstream router sees it.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::AdmissionError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{AdmissionComponents, AdmissionPipeline, Admitted};
