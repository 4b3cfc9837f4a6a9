//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages and HTTP layer produce:
//!     → logging.rs (structured log events, `security_audit` target)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every rejection and audit event
//! - API keys are only ever logged masked

pub mod logging;
pub mod metrics;
