//! Request admission pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound (context + headers + envelope)
//!     → ip_allow_list      (IpAllowList)
//!     → ip_rate_limit      (FixedWindowLimiter, keyed by client IP)
//!     → payload_guard      (PayloadGuard)
//!     → sanitize           (Sanitizer, mutates the envelope)
//!     → injection          (InjectionRules, write methods only)
//!     → authenticate       (KeyStore, sets identity)
//!     → key_rate_limit     (SlidingWindowLimiter, keyed by API key)
//!     → audit              (log only, never rejects)
//!     → Outcome::Forward(Admitted) | Outcome::Reject(Rejected)
//! ```
//!
//! # Design Decisions
//! - Stages are an explicit ordered list; the first rejection ends the run
//! - Envelope mutations are kept even when a later stage rejects
//! - A panicking stage becomes `AdmissionError::Internal` instead of
//!   tearing down the connection

pub mod components;
pub mod envelope;
pub mod stages;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::error::AdmissionError;
use crate::observability::metrics;

pub use components::AdmissionComponents;
pub use envelope::{Admitted, Inbound, RequestContext, RequestEnvelope};

/// One admission check.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect or mutate the request. `Err` rejects it.
    fn evaluate(&self, inbound: &mut Inbound) -> Result<(), AdmissionError>;
}

/// Request refused by a stage.
#[derive(Debug)]
pub struct Rejected {
    pub context: RequestContext,
    pub stage: &'static str,
    pub error: AdmissionError,
}

#[derive(Debug)]
pub enum Outcome {
    Forward(Admitted),
    Reject(Rejected),
}

/// Ordered list of stages.
#[derive(Default)]
pub struct AdmissionPipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl AdmissionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn admit(&self, mut inbound: Inbound) -> Outcome {
        let started = Instant::now();

        for stage in &self.stages {
            let result = panic::catch_unwind(AssertUnwindSafe(|| stage.evaluate(&mut inbound)))
                .unwrap_or_else(|payload| {
                    let detail = panic_detail(payload.as_ref());
                    tracing::error!(
                        request_id = %inbound.context.request_id,
                        stage = stage.name(),
                        detail = %detail,
                        "Admission stage panicked"
                    );
                    Err(AdmissionError::Internal(format!("stage {} panicked: {}", stage.name(), detail)))
                });

            if let Err(error) = result {
                if error.status().is_server_error() {
                    tracing::error!(
                        request_id = %inbound.context.request_id,
                        stage = stage.name(),
                        error = %error,
                        "Admission failed"
                    );
                } else {
                    tracing::warn!(
                        request_id = %inbound.context.request_id,
                        client_ip = %inbound.context.client_ip_label(),
                        stage = stage.name(),
                        code = error.code(),
                        error = %error,
                        "Request rejected"
                    );
                }
                metrics::record_rejected(stage.name(), error.code(), started);
                return Outcome::Reject(Rejected {
                    context: inbound.context,
                    stage: stage.name(),
                    error,
                });
            }
        }

        metrics::record_admitted(started);
        Outcome::Forward(Admitted {
            context: inbound.context,
            envelope: inbound.envelope,
            identity: inbound.identity,
        })
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
