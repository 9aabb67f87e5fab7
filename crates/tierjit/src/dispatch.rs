//! Tiered dispatch.
//!
//! Provides the shared tiering state, the promotion policy, the
//! [`Dispatcher`] callers go through on every invocation, and the
//! [`Compiler`] / [`ExecutionEngine`] traits the host engine implements.

use std::sync::Arc;

use crate::cache::MethodCache;
use crate::config::TieringConfig;
use crate::coordinator::{CompilationCoordinator, RequestOutcome};
use crate::counter::HotnessTracker;
use crate::error::TieringError;
use crate::reporter::{FailureReporter, TracingReporter};
use crate::types::{CompiledMethod, ExecutionResult, MethodId, Tier, TieringMetrics};

/// Produces compiled artifacts. Implemented by the host engine.
///
/// May block for as long as it likes; it only ever runs on compiler worker
/// threads. Errors and panics are contained by the coordinator.
pub trait Compiler: Send + Sync {
    fn compile(&self, method: MethodId, tier: Tier) -> Result<CompiledMethod, TieringError>;
}

/// Runs methods. Implemented by the host engine.
pub trait ExecutionEngine: Send + Sync {
    /// Run a method without compiled code. Always succeeds.
    fn interpret(&self, method: MethodId) -> ExecutionResult;

    /// Run a previously compiled artifact.
    fn execute(&self, compiled: &CompiledMethod) -> ExecutionResult;
}

/// Decides which tier, if any, a call should request.
///
/// Thresholds compare against the call count *including* the current call,
/// not the count seen before it. Comparing the earlier count would push
/// every promotion one call later than the documented call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionPolicy {
    pub t1_threshold: u64,
    pub t2_threshold: u64,
}

impl PromotionPolicy {
    pub fn from_config(config: &TieringConfig) -> Self {
        Self {
            t1_threshold: config.t1_threshold,
            t2_threshold: config.t2_threshold,
        }
    }

    /// Tier to request for a call that saw `previous` earlier invocations
    /// and `cached` in the method cache.
    ///
    /// The current call counts toward hotness: with the default thresholds
    /// call 5001 is the first to request T1 and call 10001 the first to
    /// request T2.
    pub fn decide(&self, previous: u64, cached: Option<Tier>) -> Option<Tier> {
        let calls = previous.saturating_add(1);
        if calls > self.t2_threshold && cached.is_none_or(|tier| tier < Tier::T2) {
            Some(Tier::T2)
        } else if calls > self.t1_threshold && cached.is_none() {
            Some(Tier::T1)
        } else {
            None
        }
    }
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self::from_config(&TieringConfig::default())
    }
}

/// Tiering state shared by every [`Dispatcher`].
///
/// Constructed once and handed to dispatchers behind an `Arc`.
pub struct TieringState {
    /// Best compiled artifact per method.
    pub cache: MethodCache,
    /// Per-method invocation counts.
    pub counter: HotnessTracker,
    /// Configuration the state was built with.
    pub config: TieringConfig,
    /// Dispatch and compilation counters.
    pub metrics: Arc<TieringMetrics>,
    policy: PromotionPolicy,
    coordinator: CompilationCoordinator,
}

impl TieringState {
    /// Validate `config` and start the compiler pool, logging failures
    /// through `tracing`.
    pub fn new(config: TieringConfig, compiler: Arc<dyn Compiler>) -> Result<Self, TieringError> {
        Self::with_reporter(config, compiler, Arc::new(TracingReporter))
    }

    /// Like [`TieringState::new`] with a custom failure reporter.
    pub fn with_reporter(
        config: TieringConfig,
        compiler: Arc<dyn Compiler>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Result<Self, TieringError> {
        config.validate()?;

        let cache = MethodCache::new();
        let metrics = Arc::new(TieringMetrics::new());
        let coordinator = CompilationCoordinator::start(
            config.compile_workers,
            compiler,
            cache.clone(),
            reporter,
            Arc::clone(&metrics),
        );

        tracing::debug!(
            workers = config.compile_workers,
            mode = ?config.mode,
            t1_threshold = config.t1_threshold,
            t2_threshold = config.t2_threshold,
            "Tiering state started"
        );

        Ok(Self {
            cache,
            counter: HotnessTracker::new(),
            policy: PromotionPolicy::from_config(&config),
            config,
            metrics,
            coordinator,
        })
    }

    pub fn coordinator(&self) -> &CompilationCoordinator {
        &self.coordinator
    }

    pub fn policy(&self) -> PromotionPolicy {
        self.policy
    }

    /// Clear the cache, counts and metrics.
    ///
    /// Jobs still in flight may install artifacts after this returns.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn reset_for_testing(&self) {
        self.cache.clear();
        self.counter.clear();
        self.metrics.reset();
    }
}

impl std::fmt::Debug for TieringState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieringState")
            .field("config", &self.config)
            .field("cached_methods", &self.cache.len())
            .field("tracked_methods", &self.counter.len())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Entry point for method invocations.
///
/// Cheap to clone; every clone shares the same [`TieringState`].
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<TieringState>,
    engine: Arc<dyn ExecutionEngine>,
}

impl Dispatcher {
    pub fn new(state: Arc<TieringState>, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { state, engine }
    }

    pub fn state(&self) -> &Arc<TieringState> {
        &self.state
    }

    /// Run `method` at the best tier available, requesting a promotion
    /// first if the method has become hot enough.
    ///
    /// Never fails: compile failures are handled by the coordinator and
    /// the call falls back to whatever is cached, or to the interpreter.
    pub fn execute_method(&self, method: MethodId) -> ExecutionResult {
        let state = &*self.state;

        let previous = state.counter.increment(method);
        let cached = state.cache.lookup(method).map(|entry| entry.tier);

        if let Some(tier) = state.policy.decide(previous, cached) {
            TieringMetrics::bump(&state.metrics.compile_requests);
            let outcome = state.coordinator.request(method, tier, state.config.mode);
            if matches!(outcome, RequestOutcome::Submitted(_)) {
                tracing::debug!(
                    method = %method,
                    tier = %tier,
                    calls = previous.saturating_add(1),
                    "Promotion requested"
                );
            }
        }

        match state.cache.lookup(method) {
            Some(entry) => {
                TieringMetrics::bump(&state.metrics.compiled_executions);
                self.engine.execute(&entry.compiled)
            }
            None => {
                TieringMetrics::bump(&state.metrics.interpreted_executions);
                self.engine.interpret(method)
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_cold_method_interprets() {
        let policy = PromotionPolicy::default();
        assert_eq!(policy.decide(0, None), None);
        assert_eq!(policy.decide(4_999, None), None);
    }

    #[test]
    fn test_policy_t1_boundary() {
        let policy = PromotionPolicy::default();
        // Call 5001 sees 5000 previous invocations.
        assert_eq!(policy.decide(5_000, None), Some(Tier::T1));
        assert_eq!(policy.decide(5_000, Some(Tier::T1)), None);
        assert_eq!(policy.decide(9_999, Some(Tier::T1)), None);
    }

    #[test]
    fn test_policy_t2_boundary() {
        let policy = PromotionPolicy::default();
        assert_eq!(policy.decide(10_000, Some(Tier::T1)), Some(Tier::T2));
        assert_eq!(policy.decide(10_000, None), Some(Tier::T2));
        assert_eq!(policy.decide(10_000, Some(Tier::T2)), None);
        assert_eq!(policy.decide(u64::MAX, Some(Tier::T2)), None);
    }

    #[test]
    fn test_policy_custom_thresholds() {
        let config = TieringConfig::default().with_thresholds(2, 4);
        let policy = PromotionPolicy::from_config(&config);
        assert_eq!(policy.decide(1, None), None);
        assert_eq!(policy.decide(2, None), Some(Tier::T1));
        assert_eq!(policy.decide(4, Some(Tier::T1)), Some(Tier::T2));
    }
}
