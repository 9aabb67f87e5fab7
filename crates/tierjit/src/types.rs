//! Tiered execution types.
//!
//! Core data structures shared by the hotness tracker, the method cache,
//! the compilation coordinator and the dispatcher.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque method identifier supplied by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodId(pub u64);

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m#{}", self.0)
    }
}

impl From<u64> for MethodId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Optimization level a method runs at.
///
/// The derived ordering is the promotion order: `Interpreted < T1 < T2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Interpreted,
    T1,
    T2,
}

impl Tier {
    /// The tier a method is promoted to from this one, if any.
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Interpreted => Some(Tier::T1),
            Tier::T1 => Some(Tier::T2),
            Tier::T2 => None,
        }
    }

    /// Whether code at this tier comes out of the compiler.
    pub fn is_compiled(self) -> bool {
        self != Tier::Interpreted
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Interpreted => "interpreted",
            Tier::T1 => "t1",
            Tier::T2 => "t2",
        };
        f.write_str(name)
    }
}

/// Compiled artifact for a `(MethodId, Tier)` pair.
///
/// The code blob is produced by the external compiler and never mutated
/// afterwards, so the artifact can be shared freely between threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMethod {
    /// Method this artifact was compiled from.
    pub method: MethodId,
    /// Tier the compiler produced.
    pub tier: Tier,
    /// Opaque machine code handed back to the execution engine.
    pub code: Bytes,
}

impl CompiledMethod {
    pub fn new(method: MethodId, tier: Tier, code: Bytes) -> Self {
        Self { method, tier, code }
    }
}

/// Result of running a method through the execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Method that was executed.
    pub method: MethodId,
    /// Tier the call actually ran at.
    pub tier: Tier,
    /// Engine-defined output.
    pub output: Bytes,
}

/// Whether a caller waits for the compile it triggered.
///
/// Fixed for the whole system through configuration, never chosen per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompileMode {
    /// The triggering caller waits for the job (or the job it coalesced onto)
    /// before re-reading the cache.
    #[default]
    Blocking,
    /// The request is queued and the caller proceeds with whatever is cached.
    NonBlocking,
}

/// Atomic counters for dispatch and compilation events.
#[derive(Debug)]
pub struct TieringMetrics {
    /// Calls that ran through the interpreter.
    pub interpreted_executions: AtomicU64,
    /// Calls that ran compiled code.
    pub compiled_executions: AtomicU64,
    /// Promotion requests computed by the dispatcher.
    pub compile_requests: AtomicU64,
    /// Requests merged into an already running job.
    pub coalesced_requests: AtomicU64,
    /// Requests dropped because the cache already held the target tier.
    pub satisfied_requests: AtomicU64,
    /// Artifacts installed into the cache.
    pub compilations: AtomicU64,
    /// Compiles that failed or panicked.
    pub compilation_failures: AtomicU64,
    /// Artifacts discarded by the monotonic-upgrade rule.
    pub rejected_upgrades: AtomicU64,
}

/// Point-in-time copy of [`TieringMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub interpreted_executions: u64,
    pub compiled_executions: u64,
    pub compile_requests: u64,
    pub coalesced_requests: u64,
    pub satisfied_requests: u64,
    pub compilations: u64,
    pub compilation_failures: u64,
    pub rejected_upgrades: u64,
}

impl TieringMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            interpreted_executions: AtomicU64::new(0),
            compiled_executions: AtomicU64::new(0),
            compile_requests: AtomicU64::new(0),
            coalesced_requests: AtomicU64::new(0),
            satisfied_requests: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
            compilation_failures: AtomicU64::new(0),
            rejected_upgrades: AtomicU64::new(0),
        }
    }

    /// Bump a counter by one.
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset all counters to zero.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn reset(&self) {
        self.interpreted_executions.store(0, Ordering::Relaxed);
        self.compiled_executions.store(0, Ordering::Relaxed);
        self.compile_requests.store(0, Ordering::Relaxed);
        self.coalesced_requests.store(0, Ordering::Relaxed);
        self.satisfied_requests.store(0, Ordering::Relaxed);
        self.compilations.store(0, Ordering::Relaxed);
        self.compilation_failures.store(0, Ordering::Relaxed);
        self.rejected_upgrades.store(0, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            interpreted_executions: self.interpreted_executions.load(Ordering::Relaxed),
            compiled_executions: self.compiled_executions.load(Ordering::Relaxed),
            compile_requests: self.compile_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            satisfied_requests: self.satisfied_requests.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            compilation_failures: self.compilation_failures.load(Ordering::Relaxed),
            rejected_upgrades: self.rejected_upgrades.load(Ordering::Relaxed),
        }
    }
}

impl Default for TieringMetrics {
    fn default() -> Self {
        Self::new()
    }
}
