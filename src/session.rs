//! Fuzz session coordinator
//!
//! Discovers the generator's case documents, profiles them without and then
//! with the candidate script, and runs the oracle. Only baseline survivors
//! enter the candidate pass. Every input case ends up with exactly one
//! [`CaseVerdict`].

use crate::config::{Mode, SessionConfig};
use crate::environment::ExecutionEnvironment;
use crate::oracle::{ArtifactPaths, CaseResult, Finding, Oracle, PerformanceResult};
use crate::profiler::{
    CaseProfiles, DiscardKind, DiscardedCase, Profiler, ProfilerConfig, ScriptOption,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Case documents in `dir`: resolved `.html`/`.htm` paths in sorted order
pub fn discover_cases<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve case directory: {}", dir.display()))?;

    let mut cases = Vec::new();
    for entry in std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to read case directory: {}", dir.display()))?
    {
        let path = entry?.path();
        let is_document = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
        if is_document && path.is_file() {
            cases.push(path);
        }
    }
    cases.sort();
    Ok(cases)
}

/// Final outcome of one case
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CaseVerdict {
    Discarded {
        kind: DiscardKind,
        reason: String,
    },
    NoDifference,
    BehaviorDifference {
        diff_apis: BTreeSet<String>,
        artifacts: Option<ArtifactPaths>,
    },
    PerformanceRegression {
        result: PerformanceResult,
    },
}

impl CaseVerdict {
    fn from_result(result: &CaseResult) -> Self {
        match &result.finding {
            Finding::Behavior(behavior) if behavior.is_different => {
                CaseVerdict::BehaviorDifference {
                    diff_apis: behavior.diff_apis.clone().unwrap_or_default(),
                    artifacts: behavior.artifacts.clone(),
                }
            }
            Finding::Performance(performance) if performance.is_regression() => {
                CaseVerdict::PerformanceRegression {
                    result: performance.clone(),
                }
            }
            _ => CaseVerdict::NoDifference,
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(
            self,
            CaseVerdict::BehaviorDifference { .. } | CaseVerdict::PerformanceRegression { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseReport {
    pub case: PathBuf,
    #[serde(flatten)]
    pub verdict: CaseVerdict,
}

/// Outcome of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub mode: &'static str,
    /// One entry per input case, in input order
    pub cases: Vec<CaseReport>,
    /// Results handed to the external reporter
    pub results: Vec<CaseResult>,
}

impl SessionReport {
    /// Assemble verdicts for `cases` from both passes and the oracle output.
    pub fn assemble(
        mode: &Mode,
        cases: &[PathBuf],
        without_script: &CaseProfiles,
        with_script: &CaseProfiles,
        results: Vec<CaseResult>,
    ) -> Self {
        let reports = cases
            .iter()
            .map(|case| {
                let verdict = if let Some(result) = results.iter().find(|r| &r.case_path == case) {
                    CaseVerdict::from_result(result)
                } else if let Some(discarded) = find_discarded(without_script, case) {
                    CaseVerdict::Discarded {
                        kind: discarded.kind,
                        reason: discarded.reason.clone(),
                    }
                } else if let Some(discarded) = find_discarded(with_script, case) {
                    // The baseline survived, so the pair is what went missing
                    CaseVerdict::Discarded {
                        kind: DiscardKind::MissingPair,
                        reason: format!("lost in the with-script pass: {}", discarded.reason),
                    }
                } else {
                    CaseVerdict::Discarded {
                        kind: DiscardKind::MissingPair,
                        reason: "profiled in only one pass".to_string(),
                    }
                };
                CaseReport {
                    case: case.clone(),
                    verdict,
                }
            })
            .collect();

        SessionReport {
            mode: mode.label(),
            cases: reports,
            results,
        }
    }

    pub fn flagged(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|report| report.verdict.is_flagged())
    }

    pub fn discarded_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|report| matches!(report.verdict, CaseVerdict::Discarded { .. }))
            .count()
    }

    /// Human-readable summary
    pub fn to_report_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== sidefx {} report ===\n", self.mode);

        for report in &self.cases {
            let name = report
                .case
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| report.case.display().to_string());

            match &report.verdict {
                CaseVerdict::Discarded { kind, reason } => {
                    let _ = writeln!(out, "⏭️  {name}: discarded ({kind}): {reason}");
                }
                CaseVerdict::NoDifference => {
                    let _ = writeln!(out, "✅ {name}: no difference");
                }
                CaseVerdict::BehaviorDifference {
                    diff_apis,
                    artifacts,
                } => {
                    let apis: Vec<&str> = diff_apis.iter().map(String::as_str).collect();
                    let _ = writeln!(out, "❌ {name}: behavior difference in {}", apis.join(", "));
                    if let Some(artifacts) = artifacts {
                        let diff = artifacts.path_to_record_diff.display();
                        let _ = writeln!(out, "   diff: {diff}");
                    }
                }
                CaseVerdict::PerformanceRegression { result } => {
                    let _ = writeln!(
                        out,
                        "❌ {name}: {:.3}ms → {:.3}ms (σ {:.3}ms, threshold {:.0}%){}{}",
                        result.duration_ave,
                        result.duration_with_script,
                        result.duration_std_dev,
                        result.duration_threshold * 100.0,
                        if result.is_over_std_dev { " [over σ]" } else { "" },
                        if result.is_over_threshold { " [over threshold]" } else { "" },
                    );
                }
            }
        }

        let _ = writeln!(
            out,
            "\n{} cases, {} flagged, {} discarded",
            self.cases.len(),
            self.flagged().count(),
            self.discarded_count()
        );
        out
    }
}

/// One differential run over a batch of cases
pub struct Session<'a, E: ExecutionEnvironment + ?Sized> {
    env: &'a E,
    mode: Mode,
    oracle: Oracle,
    profiler_config: ProfilerConfig,
}

impl<'a, E: ExecutionEnvironment + ?Sized> Session<'a, E> {
    /// Resolve the mode and build the oracle; fails before any page is loaded.
    pub fn new(env: &'a E, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let mode = config.mode()?;
        let oracle = Oracle::new(mode, config.anchor.clone())?;
        Ok(Session {
            env,
            mode,
            oracle,
            profiler_config: config.profiler_config(),
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Baseline pass, candidate pass over survivors, then the oracle.
    pub async fn run(
        &self,
        cases: &[PathBuf],
        candidate: &ScriptOption<E>,
    ) -> Result<SessionReport> {
        let (without_script, with_script) = self.profile(cases, candidate).await;

        let results = self
            .oracle
            .generate_results(&without_script, &with_script)
            .context("Failed to generate results")?;

        let report =
            SessionReport::assemble(&self.mode, cases, &without_script, &with_script, results);
        tracing::info!(
            cases = report.cases.len(),
            flagged = report.flagged().count(),
            discarded = report.discarded_count(),
            "session done"
        );
        Ok(report)
    }

    /// Both profiling passes, for hosts that persist profiles and analyze later
    pub async fn profile(
        &self,
        cases: &[PathBuf],
        candidate: &ScriptOption<E>,
    ) -> (CaseProfiles, CaseProfiles) {
        let profiler = Profiler::new(self.env, &self.profiler_config);

        let without_script = profiler.profile_cases(cases, &self.mode, None).await;
        let survivors: Vec<PathBuf> = without_script.cases().map(Path::to_path_buf).collect();
        let with_script = profiler
            .profile_cases(&survivors, &self.mode, Some(candidate))
            .await;

        (without_script, with_script)
    }
}

/// Analyze two persisted passes; for `sidefx analyze`.
pub fn analyze_profiles(
    config: &SessionConfig,
    without_script: &CaseProfiles,
    with_script: &CaseProfiles,
) -> Result<SessionReport> {
    config.validate()?;
    let mode = config.mode()?;
    let oracle = Oracle::new(mode, config.anchor.clone())?;
    let results = oracle.generate_results(without_script, with_script)?;

    let cases: BTreeSet<&Path> = without_script
        .cases()
        .chain(with_script.cases())
        .chain(without_script.discarded().iter().map(|d| d.case.as_path()))
        .chain(with_script.discarded().iter().map(|d| d.case.as_path()))
        .collect();
    let cases: Vec<PathBuf> = cases.into_iter().map(Path::to_path_buf).collect();

    Ok(SessionReport::assemble(&mode, &cases, without_script, with_script, results))
}

fn find_discarded<'a>(profiles: &'a CaseProfiles, case: &Path) -> Option<&'a DiscardedCase> {
    profiles.discarded().iter().find(|d| d.case == case)
}
