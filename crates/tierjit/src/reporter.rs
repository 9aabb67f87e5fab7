//! Compile failure reporting.
//!
//! Failures never reach the dispatcher's caller. The coordinator hands each
//! one to a [`FailureReporter`], which defaults to structured logging.

use crate::error::CompileFailure;

/// Receives every compile that did not produce a cache entry.
///
/// Called on a compiler worker thread (or on the requesting thread when the
/// pool has shut down), so implementations must not block for long.
pub trait FailureReporter: Send + Sync {
    fn report(&self, failure: &CompileFailure);
}

/// Logs failures through `tracing` at `warn` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn report(&self, failure: &CompileFailure) {
        tracing::warn!(
            method = %failure.method,
            tier = %failure.tier,
            error = %failure.error,
            "Compilation failed, method keeps its current tier"
        );
    }
}
