// Case profiles: one reference trace plus duration samples per case
//
// A CaseProfiles map is built fresh for each pass (baseline, candidate) and
// carries the cases that pass discarded, with the reason, so a session can
// report every input case exactly once.

use crate::recorder::ApiRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Reference trace and duration samples of one case in one pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseProfile {
    /// Records of the first sample
    pub records: Vec<ApiRecord>,
    /// One wall-clock duration per sample, in milliseconds, in sample order
    pub durations: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscardKind {
    /// Consecutive samples diverged
    Flaky,
    /// Timeout, navigation failure, or the entry point threw
    Execution,
    /// Profiled in only one of the two passes
    MissingPair,
}

impl fmt::Display for DiscardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardKind::Flaky => write!(f, "flaky"),
            DiscardKind::Execution => write!(f, "execution error"),
            DiscardKind::MissingPair => write!(f, "missing pair"),
        }
    }
}

/// A case excluded from measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardedCase {
    pub case: PathBuf,
    pub kind: DiscardKind,
    pub reason: String,
}

/// Profiles keyed by resolved case path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseProfiles {
    profiles: BTreeMap<PathBuf, CaseProfile>,
    #[serde(default)]
    discarded: Vec<DiscardedCase>,
}

impl CaseProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, case: impl Into<PathBuf>, profile: CaseProfile) {
        self.profiles.insert(case.into(), profile);
    }

    /// Record a discarded case; it is removed from the profiles if present.
    pub fn discard(&mut self, discarded: DiscardedCase) {
        self.profiles.remove(&discarded.case);
        self.discarded.push(discarded);
    }

    pub fn get(&self, case: &Path) -> Option<&CaseProfile> {
        self.profiles.get(case)
    }

    pub fn contains(&self, case: &Path) -> bool {
        self.profiles.contains_key(case)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiled cases in path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, &CaseProfile)> {
        self.profiles.iter().map(|(case, profile)| (case.as_path(), profile))
    }

    pub fn cases(&self) -> impl Iterator<Item = &Path> {
        self.profiles.keys().map(PathBuf::as_path)
    }

    pub fn discarded(&self) -> &[DiscardedCase] {
        &self.discarded
    }

    /// Load profiles written by [`CaseProfiles::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profiles: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse profiles: {}", path.display()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize profiles")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write profiles: {}", path.display()))
    }
}
