//! TOML-compatible configuration for the tiered dispatcher.
//!
//! ```toml
//! compile_workers = 4
//! mode = "non-blocking"
//! t1_threshold = 5000
//! t2_threshold = 10000
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TieringError;
use crate::types::CompileMode;

/// Default invocation count after which a method is compiled at T1.
pub const DEFAULT_T1_THRESHOLD: u64 = 5_000;
/// Default invocation count after which a method is compiled at T2.
pub const DEFAULT_T2_THRESHOLD: u64 = 10_000;

/// Configuration for the tiered dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieringConfig {
    /// Number of background compilation worker threads.
    pub compile_workers: usize,
    /// Whether callers wait for the compile they trigger.
    pub mode: CompileMode,
    /// A method whose call count exceeds this is promoted to T1.
    pub t1_threshold: u64,
    /// A method whose call count exceeds this is promoted to T2.
    pub t2_threshold: u64,
}

impl Default for TieringConfig {
    fn default() -> Self {
        Self {
            compile_workers: 1,
            mode: CompileMode::Blocking,
            t1_threshold: DEFAULT_T1_THRESHOLD,
            t2_threshold: DEFAULT_T2_THRESHOLD,
        }
    }
}

impl TieringConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, TieringError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TieringError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| TieringError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check that the values describe a usable system.
    pub fn validate(&self) -> Result<(), TieringError> {
        if self.compile_workers == 0 {
            return Err(TieringError::InvalidConfig(
                "compile_workers must be at least 1".to_string(),
            ));
        }
        if self.t1_threshold >= self.t2_threshold {
            return Err(TieringError::InvalidConfig(format!(
                "t1_threshold ({}) must be below t2_threshold ({})",
                self.t1_threshold, self.t2_threshold
            )));
        }
        Ok(())
    }

    pub fn with_workers(mut self, compile_workers: usize) -> Self {
        self.compile_workers = compile_workers;
        self
    }

    pub fn with_mode(mut self, mode: CompileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_thresholds(mut self, t1_threshold: u64, t2_threshold: u64) -> Self {
        self.t1_threshold = t1_threshold;
        self.t2_threshold = t2_threshold;
        self
    }
}
