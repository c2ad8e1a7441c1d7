//! Profiler: builds trustworthy [`CaseProfiles`] for a batch of cases
//!
//! Each case is executed several times on a fresh page. Consecutive samples
//! must produce the same trace; a case that diverges, times out, or throws is
//! discarded and the batch continues. Behavior mode runs cases concurrently
//! in bounded chunks. Performance mode runs serially so timings are not
//! perturbed, and skips instrumentation so wrappers do not add overhead.

mod profile;
mod runner;

pub use profile::{CaseProfile, CaseProfiles, DiscardKind, DiscardedCase};
pub use runner::{Profiler, ScriptOption};

use crate::config::Mode;
use std::time::Duration;

/// Sampling and scheduling settings for one pass
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilerConfig {
    pub behavior_samples: usize,
    pub performance_samples: usize,
    pub parallel_chunk_size: usize,
    /// Deadline for each page interaction
    pub timeout: Duration,
    pub entry_point: String,
    /// Delete discarded case documents from disk
    pub prune_discarded: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            behavior_samples: 3,
            performance_samples: 15,
            parallel_chunk_size: 4,
            timeout: Duration::from_millis(2000),
            entry_point: "jsfuzzer".to_string(),
            prune_discarded: false,
        }
    }
}

impl ProfilerConfig {
    pub fn sample_count(&self, mode: &Mode) -> usize {
        match mode {
            Mode::Behavior => self.behavior_samples,
            Mode::Performance { .. } => self.performance_samples,
        }
    }
}
