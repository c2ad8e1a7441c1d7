// Per-case oracle output
//
// Serialized in camelCase for the external report renderer:
//   {fileName, casePath, record: {isDifferent, diffApis?, pathToRecord...?}}
//   {fileName, casePath, duration: {durationAve, durationStdDev, ...}}

use super::artifacts::ArtifactPaths;
use super::compare::Divergence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Outcome of the trace comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorResult {
    pub is_different: bool,

    /// API names implicated by the trace diff; present only when different
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_apis: Option<BTreeSet<String>>,

    /// Absent fields when there is no difference
    #[serde(flatten)]
    pub artifacts: Option<ArtifactPaths>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_divergence: Option<Divergence>,
}

impl BehaviorResult {
    pub fn same() -> Self {
        BehaviorResult {
            is_different: false,
            diff_apis: None,
            artifacts: None,
            first_divergence: None,
        }
    }
}

/// Outcome of the duration comparison, figures in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceResult {
    /// Baseline mean
    pub duration_ave: f64,
    /// Baseline population standard deviation
    pub duration_std_dev: f64,
    pub duration_threshold: f64,
    /// Candidate mean
    pub duration_with_script: f64,
    pub is_over_std_dev: bool,
    pub is_over_threshold: bool,
}

impl PerformanceResult {
    pub fn is_regression(&self) -> bool {
        self.is_over_std_dev || self.is_over_threshold
    }

    /// Relative slowdown of the candidate, `None` for a zero baseline
    pub fn slowdown(&self) -> Option<f64> {
        if self.duration_ave == 0.0 {
            None
        } else {
            Some((self.duration_with_script - self.duration_ave) / self.duration_ave)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Finding {
    #[serde(rename = "record")]
    Behavior(BehaviorResult),
    #[serde(rename = "duration")]
    Performance(PerformanceResult),
}

/// Oracle result for one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    /// Base name of the case document
    pub file_name: String,
    /// Resolved case identity, for linking back to the document
    pub case_path: PathBuf,
    #[serde(flatten)]
    pub finding: Finding,
}

impl CaseResult {
    pub fn new(case: &Path, finding: Finding) -> Self {
        let file_name = case
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        CaseResult {
            file_name,
            case_path: case.to_path_buf(),
            finding,
        }
    }

    /// True for a behavior difference or a performance regression
    pub fn is_flagged(&self) -> bool {
        match &self.finding {
            Finding::Behavior(result) => result.is_different,
            Finding::Performance(result) => result.is_regression(),
        }
    }
}
