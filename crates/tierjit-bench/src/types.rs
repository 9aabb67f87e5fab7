use serde::{Deserialize, Serialize};
use tierjit::{MethodId, MetricsSnapshot, Tier, TieringConfig};

/// Shape of the synthetic workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    /// Number of distinct methods. Ids are `0..methods`.
    pub methods: u64,
    /// Total calls across all caller threads.
    pub calls: u64,
    /// Caller threads.
    pub threads: usize,
    /// The first `hot_methods` ids form the hot set.
    pub hot_methods: u64,
    /// Probability that a call targets the hot set.
    pub hot_ratio: f64,
    /// Seed for the caller and compiler RNGs.
    pub seed: u64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            methods: 1_000,
            calls: 1_000_000,
            threads: 8,
            hot_methods: 10,
            hot_ratio: 0.9,
            seed: 42,
        }
    }
}

/// Behavior of the simulated compiler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompilerProfile {
    /// Time every compile sleeps for.
    pub latency_ms: u64,
    /// Probability that a compile fails.
    pub failure_rate: f64,
}

impl Default for CompilerProfile {
    fn default() -> Self {
        Self {
            latency_ms: 5,
            failure_rate: 0.0,
        }
    }
}

/// Executions per tier, as observed by the callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub interpreted: u64,
    pub t1: u64,
    pub t2: u64,
}

impl TierCounts {
    pub fn record(&mut self, tier: Tier) {
        match tier {
            Tier::Interpreted => self.interpreted += 1,
            Tier::T1 => self.t1 += 1,
            Tier::T2 => self.t2 += 1,
        }
    }

    pub fn merge(&mut self, other: &TierCounts) {
        self.interpreted += other.interpreted;
        self.t1 += other.t1;
        self.t2 += other.t2;
    }

    pub fn total(&self) -> u64 {
        self.interpreted + self.t1 + self.t2
    }
}

/// Final state of one hot method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotMethodReport {
    pub method: MethodId,
    pub calls: u64,
    pub tier: Tier,
}

/// Compile attempts seen by the simulated compiler.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompilerReport {
    pub attempts: u64,
    pub failures: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimulationReport {
    pub config: TieringConfig,
    pub workload: Workload,
    pub compiler_profile: CompilerProfile,
    pub wall_time_ms: u64,
    pub executions: TierCounts,
    pub metrics: MetricsSnapshot,
    pub compiler: CompilerReport,
    pub hot_methods: Vec<HotMethodReport>,
    pub cached_methods: usize,
}
