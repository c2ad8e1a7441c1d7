//! Error taxonomy
//!
//! Per-case failures (`CaseError`) are recovered inside the profiler by
//! discarding the case. `OracleError` and `ConfigError` are fatal at their
//! call boundary.

use crate::environment::EnvironmentError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single case could not be profiled
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaseError {
    #[error("flaky case: sample {sample} diverged from the previous sample at record {index}")]
    Flaky { sample: usize, index: usize },

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("entry point threw: {0}")]
    EntryPoint(String),

    #[error("malformed run payload: {0}")]
    MalformedRun(String),
}

impl CaseError {
    pub fn is_flaky(&self) -> bool {
        matches!(self, CaseError::Flaky { .. })
    }
}

/// Errors that abort result generation
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("performance threshold must be a finite, non-negative fraction, got {0}")]
    InvalidThreshold(f64),

    #[error("failed to write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors in session configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("performance mode requires `performance_threshold`")]
    MissingThreshold,

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
