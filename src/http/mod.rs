//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, routes)
//!     → request.rs (stamp X-Request-ID)
//!     → middleware/admission.rs (decode via body.rs, run pipeline)
//!     → handlers.rs (banner, health, downstream router, 404)
//!     → response.rs (error and success envelopes)
//!     → Send to client
//! ```

pub mod body;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
