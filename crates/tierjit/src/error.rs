//! Error types for the tiered dispatcher.

use std::path::PathBuf;

use crate::types::{MethodId, Tier};

/// Errors that can occur during compilation or configuration.
#[derive(Debug, thiserror::Error)]
pub enum TieringError {
    /// The compiler could not produce an artifact.
    #[error("compilation failed: {0}")]
    CompilationFailed(String),

    /// The compiler panicked on a worker thread.
    #[error("compiler panicked: {0}")]
    CompilerPanicked(String),

    /// The worker pool no longer accepts jobs.
    #[error("compiler pool is shut down")]
    PoolShutdown,

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`crate::config::TieringConfig`].
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// A compile that did not produce a cache entry.
///
/// Never leaves the coordinator except through a
/// [`FailureReporter`](crate::reporter::FailureReporter).
#[derive(Debug, thiserror::Error)]
#[error("{method} at tier {tier}: {error}")]
pub struct CompileFailure {
    pub method: MethodId,
    pub tier: Tier,
    #[source]
    pub error: TieringError,
}
