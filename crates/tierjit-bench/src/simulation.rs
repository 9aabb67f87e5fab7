//! Synthetic hot/cold workload against a simulated engine and compiler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use eyre::{WrapErr, bail, eyre};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tierjit::{
    CompiledMethod, Compiler, Dispatcher, ExecutionEngine, ExecutionResult, MethodId, Tier,
    TieringConfig, TieringError, TieringState,
};

use crate::types::{
    CompilerProfile, CompilerReport, HotMethodReport, SimulationReport, TierCounts, Workload,
};

/// Compiler that sleeps for a fixed latency and fails at random.
#[derive(Debug)]
pub struct SimulatedCompiler {
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<StdRng>,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl SimulatedCompiler {
    pub fn new(profile: CompilerProfile, seed: u64) -> Self {
        Self {
            latency: Duration::from_millis(profile.latency_ms),
            failure_rate: profile.failure_rate,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn report(&self) -> CompilerReport {
        CompilerReport {
            attempts: self.attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl Compiler for SimulatedCompiler {
    fn compile(&self, method: MethodId, tier: Tier) -> Result<CompiledMethod, TieringError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        #[expect(clippy::expect_used, reason = "Mutex poisoning is unrecoverable")]
        let failed = self
            .rng
            .lock()
            .expect("compiler rng lock poisoned")
            .gen_bool(self.failure_rate);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(TieringError::CompilationFailed(format!(
                "simulated failure for {method} at {tier}"
            )));
        }

        Ok(CompiledMethod::new(
            method,
            tier,
            Bytes::from(format!("{method}@{tier}")),
        ))
    }
}

/// Engine whose output names the method and the tier it ran at.
#[derive(Debug, Default)]
pub struct SimulatedEngine;

impl ExecutionEngine for SimulatedEngine {
    fn interpret(&self, method: MethodId) -> ExecutionResult {
        ExecutionResult {
            method,
            tier: Tier::Interpreted,
            output: Bytes::from(method.0.to_be_bytes().to_vec()),
        }
    }

    fn execute(&self, compiled: &CompiledMethod) -> ExecutionResult {
        ExecutionResult {
            method: compiled.method,
            tier: compiled.tier,
            output: compiled.code.clone(),
        }
    }
}

pub fn validate(workload: &Workload, profile: &CompilerProfile) -> eyre::Result<()> {
    if workload.methods == 0 {
        bail!("methods must be greater than 0");
    }
    if workload.threads == 0 {
        bail!("threads must be greater than 0");
    }
    if workload.hot_methods > workload.methods {
        bail!(
            "hot methods ({}) cannot exceed methods ({})",
            workload.hot_methods,
            workload.methods
        );
    }
    if !(0.0..=1.0).contains(&workload.hot_ratio) {
        bail!("hot ratio must be within [0, 1], got {}", workload.hot_ratio);
    }
    if !(0.0..=1.0).contains(&profile.failure_rate) {
        bail!("failure rate must be within [0, 1], got {}", profile.failure_rate);
    }
    Ok(())
}

fn pick_method(rng: &mut StdRng, workload: &Workload) -> MethodId {
    let hot = workload.hot_methods;
    let id = if hot == workload.methods || (hot > 0 && rng.gen_bool(workload.hot_ratio)) {
        rng.gen_range(0..hot)
    } else {
        rng.gen_range(hot..workload.methods)
    };
    MethodId(id)
}

/// Calls assigned to caller `index`. The remainder goes to the first callers.
fn calls_for(workload: &Workload, index: usize) -> u64 {
    let threads = workload.threads as u64;
    let base = workload.calls / threads;
    let extra = u64::from((index as u64) < workload.calls % threads);
    base + extra
}

/// Run `workload` to completion and collect the report.
pub fn run(
    config: TieringConfig,
    workload: Workload,
    profile: CompilerProfile,
) -> eyre::Result<SimulationReport> {
    validate(&workload, &profile)?;

    let compiler = Arc::new(SimulatedCompiler::new(profile, workload.seed));
    let state = TieringState::new(config.clone(), Arc::clone(&compiler) as Arc<dyn Compiler>)
        .wrap_err("failed to start tiering state")?;
    let dispatcher = Dispatcher::new(Arc::new(state), Arc::new(SimulatedEngine));

    tracing::info!(
        methods = workload.methods,
        calls = workload.calls,
        threads = workload.threads,
        hot_methods = workload.hot_methods,
        workers = config.compile_workers,
        mode = ?config.mode,
        "Starting simulation"
    );

    let started = Instant::now();
    let handles: Vec<_> = (0..workload.threads)
        .map(|index| {
            let dispatcher = dispatcher.clone();
            let workload = workload.clone();
            thread::Builder::new()
                .name(format!("tierjit-caller-{index}"))
                .spawn(move || {
                    let seed = workload.seed.wrapping_add(index as u64 + 1);
                    let mut rng = StdRng::seed_from_u64(seed);
                    let mut counts = TierCounts::default();
                    for _ in 0..calls_for(&workload, index) {
                        let method = pick_method(&mut rng, &workload);
                        counts.record(dispatcher.execute_method(method).tier);
                    }
                    counts
                })
                .wrap_err("failed to spawn caller thread")
        })
        .collect::<eyre::Result<_>>()?;

    let mut executions = TierCounts::default();
    for handle in handles {
        let counts = handle
            .join()
            .map_err(|_| eyre!("caller thread panicked"))?;
        executions.merge(&counts);
    }
    let wall_time = started.elapsed();

    let state = dispatcher.state();
    let hot_methods = (0..workload.hot_methods)
        .map(MethodId)
        .map(|method| HotMethodReport {
            method,
            calls: state.counter.get(method),
            tier: state.cache.tier_of(method),
        })
        .collect();

    tracing::info!(
        elapsed = ?wall_time,
        interpreted = executions.interpreted,
        t1 = executions.t1,
        t2 = executions.t2,
        "Simulation finished"
    );

    let metrics = state.metrics.snapshot();
    let cached_methods = state.cache.len();
    // Dropping the last dispatcher drains the compile queue.
    drop(dispatcher);

    Ok(SimulationReport {
        wall_time_ms: u64::try_from(wall_time.as_millis()).unwrap_or(u64::MAX),
        metrics,
        cached_methods,
        compiler: compiler.report(),
        config,
        workload,
        compiler_profile: profile,
        executions,
        hot_methods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierjit::CompileMode;

    fn small_workload() -> Workload {
        Workload {
            methods: 4,
            calls: 2_000,
            threads: 4,
            hot_methods: 4,
            hot_ratio: 1.0,
            seed: 7,
        }
    }

    fn instant_compiler(failure_rate: f64) -> CompilerProfile {
        CompilerProfile {
            latency_ms: 0,
            failure_rate,
        }
    }

    #[test]
    fn test_blocking_run_promotes_every_hot_method() {
        let config = TieringConfig::default()
            .with_workers(2)
            .with_thresholds(5, 10);
        let report = run(config, small_workload(), instant_compiler(0.0)).unwrap();

        assert_eq!(report.executions.total(), 2_000);
        assert_eq!(report.hot_methods.len(), 4);
        assert!(report.hot_methods.iter().all(|m| m.tier == Tier::T2));
        assert_eq!(report.hot_methods.iter().map(|m| m.calls).sum::<u64>(), 2_000);
        assert_eq!(report.cached_methods, 4);
        // One T1 and one T2 compile per method.
        assert_eq!(report.compiler.attempts, 8);
        assert_eq!(report.metrics.compilations, 8);
    }

    #[test]
    fn test_failing_compiler_leaves_everything_interpreted() {
        let config = TieringConfig::default()
            .with_mode(CompileMode::NonBlocking)
            .with_thresholds(5, 10);
        let report = run(config, small_workload(), instant_compiler(1.0)).unwrap();

        assert_eq!(report.executions.interpreted, 2_000);
        assert_eq!(report.cached_methods, 0);
        assert!(report.compiler.attempts > 0);
        assert_eq!(report.compiler.attempts, report.compiler.failures);
    }

    #[test]
    fn test_calls_are_split_across_threads() {
        let workload = Workload {
            calls: 10,
            threads: 3,
            ..Workload::default()
        };
        let split: Vec<u64> = (0..3).map(|i| calls_for(&workload, i)).collect();
        assert_eq!(split, vec![4, 3, 3]);
    }

    #[test]
    fn test_pick_method_respects_hot_set() {
        let workload = Workload {
            methods: 100,
            hot_methods: 5,
            hot_ratio: 1.0,
            ..Workload::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..1_000).all(|_| pick_method(&mut rng, &workload).0 < 5));

        let cold = Workload {
            hot_ratio: 0.0,
            ..workload
        };
        assert!((0..1_000).all(|_| pick_method(&mut rng, &cold).0 >= 5));
    }

    #[test]
    fn test_validate_rejects_bad_workloads() {
        let profile = CompilerProfile::default();
        let too_many_hot = Workload {
            methods: 2,
            hot_methods: 3,
            ..Workload::default()
        };
        assert!(validate(&too_many_hot, &profile).is_err());

        let no_threads = Workload {
            threads: 0,
            ..Workload::default()
        };
        assert!(validate(&no_threads, &profile).is_err());

        let bad_rate = CompilerProfile {
            failure_rate: 1.5,
            ..profile
        };
        assert!(validate(&Workload::default(), &bad_rate).is_err());
        assert!(validate(&Workload::default(), &profile).is_ok());
    }
}
