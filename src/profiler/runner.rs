// Case sampling and batch scheduling

use super::profile::{CaseProfile, CaseProfiles, DiscardKind, DiscardedCase};
use super::ProfilerConfig;
use crate::config::Mode;
use crate::environment::{bounded, ExecutionEnvironment, Scenario, ScriptSource};
use crate::error::CaseError;
use crate::oracle::compare_records;
use crate::recorder::{ApiRecord, RecordedRun, Recorder};
use futures_util::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Candidate script attached before measurement, with an optional pre-hook
pub struct ScriptOption<E: ExecutionEnvironment + ?Sized> {
    pub script: ScriptSource,
    pub scenario: Option<Arc<dyn Scenario<E>>>,
}

impl<E: ExecutionEnvironment + ?Sized> ScriptOption<E> {
    pub fn new(script: ScriptSource) -> Self {
        ScriptOption {
            script,
            scenario: None,
        }
    }

    pub fn with_scenario<S>(mut self, scenario: S) -> Self
    where
        S: Scenario<E> + 'static,
    {
        self.scenario = Some(Arc::new(scenario));
        self
    }
}

impl<E: ExecutionEnvironment + ?Sized> Clone for ScriptOption<E> {
    fn clone(&self) -> Self {
        ScriptOption {
            script: self.script.clone(),
            scenario: self.scenario.clone(),
        }
    }
}

/// Samples cases through a shared execution environment
pub struct Profiler<'a, E: ExecutionEnvironment + ?Sized> {
    env: &'a E,
    config: &'a ProfilerConfig,
}

impl<'a, E: ExecutionEnvironment + ?Sized> Profiler<'a, E> {
    pub fn new(env: &'a E, config: &'a ProfilerConfig) -> Self {
        Profiler { env, config }
    }

    /// Profile every case; failures are discarded, never returned.
    ///
    /// Without `script` the case runs with an empty placeholder tag attached.
    pub async fn profile_cases(
        &self,
        cases: &[PathBuf],
        mode: &Mode,
        script: Option<&ScriptOption<E>>,
    ) -> CaseProfiles {
        let pass = if script.is_some() { "with-script" } else { "without-script" };
        tracing::info!(pass, mode = mode.label(), cases = cases.len(), "profiling cases");

        let mut outcomes = Vec::with_capacity(cases.len());
        match mode {
            Mode::Behavior => {
                let chunk_size = self.config.parallel_chunk_size.max(1);
                for chunk in cases.chunks(chunk_size) {
                    // The chunk settles fully before the next one starts
                    let settled = join_all(chunk.iter().map(|case| async move {
                        (case, self.profile_case(case, mode, script).await)
                    }))
                    .await;
                    outcomes.extend(settled);
                }
            }
            Mode::Performance { .. } => {
                for case in cases {
                    outcomes.push((case, self.profile_case(case, mode, script).await));
                }
            }
        }

        let mut profiles = CaseProfiles::new();
        for (case, outcome) in outcomes {
            match outcome {
                Ok(profile) => {
                    tracing::debug!(
                        case = %case.display(),
                        records = profile.records.len(),
                        samples = profile.durations.len(),
                        "profiled"
                    );
                    profiles.insert(case.clone(), profile);
                }
                Err(e) => profiles.discard(self.discard(case, e)),
            }
        }

        tracing::info!(
            pass,
            profiled = profiles.len(),
            discarded = profiles.discarded().len(),
            "profiling done"
        );
        profiles
    }

    /// Sample one case; consecutive samples must not diverge.
    pub async fn profile_case(
        &self,
        case: &Path,
        mode: &Mode,
        script: Option<&ScriptOption<E>>,
    ) -> Result<CaseProfile, CaseError> {
        let samples = self.config.sample_count(mode);
        let mut reference: Option<Vec<ApiRecord>> = None;
        let mut previous: Option<Vec<ApiRecord>> = None;
        let mut durations = Vec::with_capacity(samples);

        for sample in 0..samples {
            let run = self.run_page(case, mode, script).await?;

            if let Some(previous) = &previous {
                if let Some(divergence) = compare_records(previous, &run.records) {
                    return Err(CaseError::Flaky {
                        sample: sample + 1,
                        index: divergence.index,
                    });
                }
            }

            durations.push(run.duration);
            if reference.is_none() {
                reference = Some(run.records.clone());
            }
            previous = Some(run.records);
        }

        Ok(CaseProfile {
            records: reference.unwrap_or_default(),
            durations,
        })
    }

    /// One sample on a fresh page; the page is always closed.
    async fn run_page(
        &self,
        case: &Path,
        mode: &Mode,
        script: Option<&ScriptOption<E>>,
    ) -> Result<RecordedRun, CaseError> {
        let timeout = self.config.timeout;
        let page = bounded(
            "load_document",
            timeout,
            self.env.load_document(case, timeout),
        )
        .await?;

        let outcome = self.measure(&page, mode, script).await;
        self.env.close_context(page).await;
        outcome
    }

    async fn measure(
        &self,
        page: &E::Handle,
        mode: &Mode,
        script: Option<&ScriptOption<E>>,
    ) -> Result<RecordedRun, CaseError> {
        let timeout = self.config.timeout;

        // Some host APIs observe whether any script tag was attached, so the
        // baseline carries an empty one.
        let placeholder = ScriptSource::empty();
        let source = script.map(|option| &option.script).unwrap_or(&placeholder);
        bounded("inject_script", timeout, self.env.inject_script(page, source)).await?;

        if let Some(scenario) = script.and_then(|option| option.scenario.as_ref()) {
            bounded("scenario", timeout, scenario.prepare(self.env, page)).await?;
        }

        let recorder = Recorder::new(self.env, page, timeout, &self.config.entry_point);
        recorder.load_bundle().await?;
        if mode.is_behavior() {
            let wrapped = recorder.instrument().await?;
            tracing::trace!(wrapped, "instrumented page");
        }
        recorder.run_and_record_script().await
    }

    fn discard(&self, case: &Path, error: CaseError) -> DiscardedCase {
        let kind = if error.is_flaky() {
            DiscardKind::Flaky
        } else {
            DiscardKind::Execution
        };
        tracing::warn!(case = %case.display(), %kind, error = %error, "discarding case");

        if self.config.prune_discarded {
            if let Err(e) = std::fs::remove_file(case) {
                tracing::warn!(case = %case.display(), error = %e, "failed to remove case");
            }
        }

        DiscardedCase {
            case: case.to_path_buf(),
            kind,
            reason: error.to_string(),
        }
    }
}
