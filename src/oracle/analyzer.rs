// Result generation over paired CaseProfiles
//
// The mode is fixed when the Oracle is built. Cases profiled in only one of
// the two passes produce no result.

use super::align::{trim_records, Anchor};
use super::artifacts::write_artifacts;
use super::compare::compare_records;
use super::result::{BehaviorResult, CaseResult, Finding, PerformanceResult};
use super::stats::check_durations;
use crate::config::Mode;
use crate::error::OracleError;
use crate::profiler::{CaseProfile, CaseProfiles};
use std::path::Path;

/// Decides behavior divergence or performance regression per case
#[derive(Debug, Clone)]
pub struct Oracle {
    mode: Mode,
    anchor: Anchor,
}

impl Oracle {
    /// Fails before any work if the performance threshold is unusable.
    pub fn new(mode: Mode, anchor: Anchor) -> Result<Self, OracleError> {
        if let Mode::Performance { threshold } = mode {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(OracleError::InvalidThreshold(threshold));
            }
        }
        Ok(Oracle { mode, anchor })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    /// One result per case present in both maps, in path order.
    pub fn generate_results(
        &self,
        without_script: &CaseProfiles,
        with_script: &CaseProfiles,
    ) -> Result<Vec<CaseResult>, OracleError> {
        let mut results = Vec::new();

        for (case, candidate) in with_script.iter() {
            let Some(baseline) = without_script.get(case) else {
                tracing::debug!(case = %case.display(), "no baseline profile, skipping");
                continue;
            };

            let finding = match self.mode {
                Mode::Behavior => {
                    Finding::Behavior(self.compare_behavior(case, baseline, candidate)?)
                }
                Mode::Performance { threshold } => Finding::Performance(
                    self.compare_performance(case, baseline, candidate, threshold),
                ),
            };
            results.push(CaseResult::new(case, finding));
        }

        Ok(results)
    }

    /// Align, compare, and on divergence write artifacts beside the case.
    pub fn compare_behavior(
        &self,
        case: &Path,
        baseline: &CaseProfile,
        candidate: &CaseProfile,
    ) -> Result<BehaviorResult, OracleError> {
        let trimmed_baseline = trim_records(&baseline.records, &self.anchor);
        let trimmed_candidate = trim_records(&candidate.records, &self.anchor);

        let Some(divergence) = compare_records(trimmed_baseline, trimmed_candidate) else {
            tracing::info!(case = %case.display(), "✅ no behavior change");
            return Ok(BehaviorResult::same());
        };

        let (artifacts, diff) = write_artifacts(case, &baseline.records, &candidate.records)?;
        tracing::info!(
            case = %case.display(),
            %divergence,
            apis = ?diff.diff_apis,
            "❌ behavior change"
        );

        Ok(BehaviorResult {
            is_different: true,
            diff_apis: Some(diff.diff_apis),
            artifacts: Some(artifacts),
            first_divergence: Some(divergence),
        })
    }

    pub fn compare_performance(
        &self,
        case: &Path,
        baseline: &CaseProfile,
        candidate: &CaseProfile,
        threshold: f64,
    ) -> PerformanceResult {
        let result = check_durations(&baseline.durations, &candidate.durations, threshold);

        if result.is_regression() {
            tracing::info!(
                case = %case.display(),
                average = result.duration_ave,
                std_dev = result.duration_std_dev,
                with_script = result.duration_with_script,
                "❌ performance regression"
            );
        } else {
            tracing::info!(
                case = %case.display(),
                average = result.duration_ave,
                with_script = result.duration_with_script,
                "✅ no performance issue"
            );
        }

        result
    }
}
