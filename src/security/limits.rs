//! Request size and shape limits.
//!
//! # Responsibilities
//! - Bound the serialized size of the request body
//! - Bound the number of distinct query parameters
//! - Bound the length of every string reachable in body and query
//!
//! # Design Decisions
//! - Body size is measured on the compact JSON serialization, not the raw
//!   bytes, so formatting whitespace does not count
//! - String length is counted in characters
//! - The first violation found is reported; traversal order is unspecified

use std::io;

use crate::error::AdmissionError;
use crate::pipeline::envelope::RequestEnvelope;

/// Ceilings enforced by [`PayloadGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    pub max_body_bytes: usize,
    pub max_query_params: usize,
    pub max_string_length: usize,
    pub max_depth: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            max_query_params: 50,
            max_string_length: 10_000,
            max_depth: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PayloadGuard {
    limits: PayloadLimits,
}

impl PayloadGuard {
    pub fn new(limits: PayloadLimits) -> Self {
        Self { limits }
    }

    pub fn check(&self, envelope: &RequestEnvelope) -> Result<(), AdmissionError> {
        let size = serialized_len(envelope)?;
        if size > self.limits.max_body_bytes {
            return Err(AdmissionError::PayloadTooLarge {
                size,
                limit: self.limits.max_body_bytes,
            });
        }

        let count = envelope.query.len();
        if count > self.limits.max_query_params {
            return Err(AdmissionError::TooManyParameters {
                count,
                limit: self.limits.max_query_params,
            });
        }

        let limit = self.limits.max_string_length;
        envelope.visit_strings(self.limits.max_depth, |path, value| {
            // Byte length is an upper bound on char count; skip the scan when short.
            if value.len() <= limit {
                return Ok(());
            }
            let length = value.chars().count();
            if length > limit {
                return Err(AdmissionError::StringTooLong {
                    path: path.to_string(),
                    length,
                    limit,
                });
            }
            Ok(())
        })
    }
}

fn serialized_len(envelope: &RequestEnvelope) -> Result<usize, AdmissionError> {
    if envelope.body.is_null() {
        return Ok(0);
    }
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, &envelope.body)
        .map_err(|e| AdmissionError::Internal(format!("body serialization failed: {e}")))?;
    Ok(counter.0)
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
