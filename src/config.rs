//! Session configuration
//!
//! Loaded from TOML; every key has a default. The string mode tag is resolved
//! once into a [`Mode`] at session start and never re-checked per call.
//!
//! ```toml
//! mode = "performance"
//! performance_threshold = 0.2
//! performance_samples = 15
//! parallel_chunk_size = 4
//! timeout_ms = 2000
//!
//! [anchor]
//! name = "getElementById"
//! arguments = '["htmlvar00001"]'
//! ```

use crate::error::ConfigError;
use crate::oracle::Anchor;
use crate::profiler::ProfilerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Mode tag as written in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    #[default]
    Behavior,
    Performance,
}

/// What a session measures
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Compare API call traces; few samples, parallel profiling
    Behavior,
    /// Compare execution time; many samples, serial profiling
    Performance {
        /// Flag when the candidate is slower by more than this fraction
        threshold: f64,
    },
}

impl Mode {
    pub fn is_behavior(&self) -> bool {
        matches!(self, Mode::Behavior)
    }

    pub fn threshold(&self) -> Option<f64> {
        match self {
            Mode::Behavior => None,
            Mode::Performance { threshold } => Some(*threshold),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Behavior => "behavior",
            Mode::Performance { .. } => "performance",
        }
    }
}

/// Configuration for one fuzz session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: ModeKind,

    /// Fraction, e.g. 0.2 flags a slowdown above 20%. Required in performance mode.
    pub performance_threshold: Option<f64>,

    /// Samples per case in behavior mode: one reference trace plus flakiness checks
    pub behavior_samples: usize,

    /// Samples per case in performance mode: enough for a stable mean and std dev
    pub performance_samples: usize,

    /// Maximum number of cases profiled concurrently in behavior mode
    pub parallel_chunk_size: usize,

    /// Deadline for each page interaction, in milliseconds
    pub timeout_ms: u64,

    /// Global function the generator defines in every case document
    pub entry_point: String,

    /// First script-independent record; everything before it is ignored
    pub anchor: Anchor,

    /// Delete discarded case documents from disk
    pub prune_discarded: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: ModeKind::Behavior,
            performance_threshold: None,
            behavior_samples: 3,
            performance_samples: 15,
            parallel_chunk_size: 4,
            timeout_ms: 2000,
            entry_point: "jsfuzzer".to_string(),
            anchor: Anchor::default(),
            prune_discarded: false,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.behavior_samples < 2 {
            return Err(ConfigError::Invalid(format!(
                "behavior_samples must be >= 2 to detect flaky cases, got {}",
                self.behavior_samples
            )));
        }

        if self.performance_samples < 2 {
            return Err(ConfigError::Invalid(format!(
                "performance_samples must be >= 2 for a standard deviation, got {}",
                self.performance_samples
            )));
        }

        if self.parallel_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "parallel_chunk_size must be >= 1".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be > 0".to_string()));
        }

        if self.entry_point.trim().is_empty() {
            return Err(ConfigError::Invalid("entry_point must not be empty".to_string()));
        }

        if let Some(threshold) = self.performance_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "performance_threshold must be a finite, non-negative fraction, got {}",
                    threshold
                )));
            }
        }

        Ok(())
    }

    /// Resolve the mode tag; performance mode without a threshold is fatal.
    pub fn mode(&self) -> Result<Mode, ConfigError> {
        match self.mode {
            ModeKind::Behavior => Ok(Mode::Behavior),
            ModeKind::Performance => self
                .performance_threshold
                .map(|threshold| Mode::Performance { threshold })
                .ok_or(ConfigError::MissingThreshold),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn profiler_config(&self) -> ProfilerConfig {
        ProfilerConfig {
            behavior_samples: self.behavior_samples,
            performance_samples: self.performance_samples,
            parallel_chunk_size: self.parallel_chunk_size,
            timeout: self.timeout(),
            entry_point: self.entry_point.clone(),
            prune_discarded: self.prune_discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.behavior_samples, 3);
        assert_eq!(config.performance_samples, 15);
        assert_eq!(config.parallel_chunk_size, 4);
        assert_eq!(config.timeout(), Duration::from_millis(2000));
        assert_eq!(config.entry_point, "jsfuzzer");
        assert!(config.validate().is_ok());
        assert_eq!(config.mode().unwrap(), Mode::Behavior);
    }

    #[test]
    fn test_performance_mode_requires_threshold() {
        let config = SessionConfig {
            mode: ModeKind::Performance,
            ..SessionConfig::default()
        };
        assert!(matches!(config.mode(), Err(ConfigError::MissingThreshold)));

        let config = SessionConfig {
            mode: ModeKind::Performance,
            performance_threshold: Some(0.2),
            ..SessionConfig::default()
        };
        assert_eq!(config.mode().unwrap(), Mode::Performance { threshold: 0.2 });
    }

    #[test]
    fn test_from_toml_with_partial_keys() {
        let config = SessionConfig::from_toml_str(
            r##"
            mode = "performance"
            performance_threshold = 0.1
            timeout_ms = 500

            [anchor]
            name = "querySelector"
            arguments = '["#root"]'
            "##,
        )
        .unwrap();

        assert_eq!(config.mode().unwrap(), Mode::Performance { threshold: 0.1 });
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.performance_samples, 15);
        assert_eq!(config.anchor.name, "querySelector");
        assert_eq!(config.anchor.arguments, r##"["#root"]"##);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SessionConfig::from_toml_str("behavior_samples = 1").is_err());
        assert!(SessionConfig::from_toml_str("parallel_chunk_size = 0").is_err());
        assert!(SessionConfig::from_toml_str("timeout_ms = 0").is_err());
        assert!(SessionConfig::from_toml_str("performance_threshold = -0.5").is_err());
        assert!(SessionConfig::from_toml_str("mode = \"fast\"").is_err());
    }

    #[test]
    fn test_profiler_config_carries_settings() {
        let config = SessionConfig {
            parallel_chunk_size: 2,
            prune_discarded: true,
            ..SessionConfig::default()
        };
        let profiler = config.profiler_config();
        assert_eq!(profiler.parallel_chunk_size, 2);
        assert!(profiler.prune_discarded);
        assert_eq!(profiler.timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_mode_accessors() {
        assert!(Mode::Behavior.is_behavior());
        assert_eq!(Mode::Behavior.threshold(), None);
        let perf = Mode::Performance { threshold: 0.3 };
        assert!(!perf.is_behavior());
        assert_eq!(perf.threshold(), Some(0.3));
        assert_eq!(perf.label(), "performance");
    }
}
