//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (via pipeline stages):
//!     → access_control.rs (client IP resolution, IP allow-list)
//!     → rate_limit.rs     (fixed window per IP, sliding window per key)
//!          └ store.rs     (bounded per-key state, LRU eviction)
//!          └ clock.rs     (injected time source)
//!     → limits.rs         (serialized size, query params, string length)
//!     → sanitize.rs       (strip active content, HTML-escape)
//!     → injection.rs      (named SQL-injection rules, exempt vocabulary)
//!     → keystore.rs       (credential extraction, API key allow-list)
//!
//! Every response:
//!     → headers.rs        (security headers, CORS)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input, including X-Forwarded-For unless configured

pub mod access_control;
pub mod clock;
pub mod headers;
pub mod injection;
pub mod keystore;
pub mod limits;
pub mod rate_limit;
pub mod sanitize;
pub mod store;
