//! Tiered execution dispatcher.
//!
//! Decides on every method invocation whether to interpret the method or
//! promote it to a compiled tier, while many caller threads invoke it
//! concurrently and a bounded pool of worker threads does the compiling.
//!
//! # Architecture
//!
//! ```text
//! caller ─► Dispatcher::execute_method
//!             ├── counter       per-method invocation counts
//!             ├── cache         best artifact per method, monotonic upgrades
//!             ├── coordinator   in-flight dedup + compiler thread pool
//!             └── ExecutionEngine::execute / interpret (host engine)
//! ```
//!
//! The host engine plugs in through the [`Compiler`] and
//! [`ExecutionEngine`] traits. Everything shared lives in one
//! [`TieringState`], built once and passed to each [`Dispatcher`] by `Arc`.
//!
//! # Feature Flags
//!
//! - `test-utils`: exposes `clear()`/`reset()` helpers on the shared state
//!   for harnesses outside this crate.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod counter;
pub mod dispatch;
pub mod error;
pub mod reporter;
pub mod types;

pub use cache::{CacheEntry, MethodCache};
pub use config::TieringConfig;
pub use coordinator::{CompilationCoordinator, CompileTicket, RequestOutcome};
pub use counter::HotnessTracker;
pub use dispatch::{Compiler, Dispatcher, ExecutionEngine, PromotionPolicy, TieringState};
pub use error::{CompileFailure, TieringError};
pub use reporter::{FailureReporter, TracingReporter};
pub use types::{
    CompileMode, CompiledMethod, ExecutionResult, MethodId, MetricsSnapshot, Tier, TieringMetrics,
};

#[cfg(test)]
mod tests;
