//! In-process execution environment
//!
//! `EmbeddedEnvironment` hosts case documents whose built-ins live in an
//! [`ApiSurface`] instead of a browser. It understands exactly the sources the
//! [`Recorder`](crate::recorder::Recorder) sends: the instrumentation bundle
//! and the named bundle entry points. Instrumentation goes through an
//! [`InterceptionTable`] owned by the page, so every loaded document gets its
//! own gate and buffer.
//!
//! Only calls that cross the surface are observable, which is all an embedding
//! host can offer.

mod surface;

pub use surface::{ApiSurface, PageScope, WeakPageScope};

use crate::environment::{EnvironmentError, ExecutionEnvironment, ScriptSource};
use crate::recorder::{
    canonicalize, ApiFunction, EntryPoint, InterceptionTable, RecordingState, Thrown,
    BUNDLE_SOURCE,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Body of a case document's entry point
pub type Program = Arc<dyn Fn(&PageScope) -> Result<(), Thrown> + Send + Sync>;

/// Effect of attaching a script to a page
pub type ScriptEffect = Arc<dyn Fn(&PageScope) + Send + Sync>;

/// One case document
#[derive(Clone)]
pub struct EmbeddedDocument {
    program: Program,
    entry_point: String,
    load_delay: Duration,
    run_delay: Duration,
}

impl EmbeddedDocument {
    pub fn new<F>(program: F) -> Self
    where
        F: Fn(&PageScope) -> Result<(), Thrown> + Send + Sync + 'static,
    {
        EmbeddedDocument {
            program: Arc::new(program),
            entry_point: "jsfuzzer".to_string(),
            load_delay: Duration::ZERO,
            run_delay: Duration::ZERO,
        }
    }

    /// Document whose entry point makes the given calls in order
    pub fn calls(calls: Vec<(&str, Value, Vec<Value>)>) -> Self {
        let calls: Vec<(String, Value, Vec<Value>)> = calls
            .into_iter()
            .map(|(path, this, args)| (path.to_string(), this, args))
            .collect();
        Self::new(move |scope| {
            for (path, this, args) in &calls {
                scope.call(path, this.clone(), args)?;
            }
            Ok(())
        })
    }

    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    /// Delay before the document reports ready
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Delay before the entry point starts; not part of the measured duration
    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = delay;
        self
    }
}

/// A loaded document
pub struct EmbeddedPage {
    case: PathBuf,
    document: EmbeddedDocument,
    scope: PageScope,
    state: RecordingState,
    table: Mutex<InterceptionTable>,
    bundle_loaded: AtomicBool,
    injected: Arc<AtomicUsize>,
}

impl EmbeddedPage {
    pub fn case(&self) -> &Path {
        &self.case
    }

    pub fn scope(&self) -> &PageScope {
        &self.scope
    }

    /// Number of script tags attached so far
    pub fn injected_scripts(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    fn run(&self) -> Result<(), EnvironmentError> {
        (self.document.program)(&self.scope).map_err(|Thrown(value)| {
            EnvironmentError::Evaluation(format!("Uncaught {}", canonicalize(&value)))
        })
    }

    async fn check_entry(&self, name: &str) -> Result<(), EnvironmentError> {
        if name != self.document.entry_point {
            return Err(EnvironmentError::Evaluation(format!(
                "ReferenceError: entry point {name} is not defined"
            )));
        }
        if !self.document.run_delay.is_zero() {
            tokio::time::sleep(self.document.run_delay).await;
        }
        Ok(())
    }
}

/// Execution environment over embedded documents
#[derive(Clone)]
pub struct EmbeddedEnvironment {
    surface: ApiSurface,
    documents: HashMap<PathBuf, EmbeddedDocument>,
    scripts: HashMap<ScriptSource, ScriptEffect>,
}

impl Default for EmbeddedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedEnvironment {
    /// Environment whose pages start from [`ApiSurface::standard`]
    pub fn new() -> Self {
        Self::with_surface(ApiSurface::standard())
    }

    pub fn with_surface(surface: ApiSurface) -> Self {
        EmbeddedEnvironment {
            surface,
            documents: HashMap::new(),
            scripts: HashMap::new(),
        }
    }

    pub fn with_document(mut self, case: impl Into<PathBuf>, document: EmbeddedDocument) -> Self {
        self.documents.insert(case.into(), document);
        self
    }

    pub fn with_script<F>(mut self, script: ScriptSource, effect: F) -> Self
    where
        F: Fn(&PageScope) + Send + Sync + 'static,
    {
        self.scripts.insert(script, Arc::new(effect));
        self
    }

    pub fn documents(&self) -> impl Iterator<Item = &Path> {
        self.documents.keys().map(PathBuf::as_path)
    }

    fn fresh_scope(&self, injected: &Arc<AtomicUsize>) -> PageScope {
        let scope = PageScope::new(self.surface.clone());
        // Host APIs that see attached script tags
        let count = Arc::clone(injected);
        scope.define(
            "globalThis.Document.prototype.getElementsByTagName",
            ApiFunction::native(move |_, args| {
                match args.first().and_then(Value::as_str) {
                    Some(tag) if tag.eq_ignore_ascii_case("script") => {
                        Ok(json!({"length": count.load(Ordering::SeqCst)}))
                    }
                    _ => Ok(json!({"length": 0})),
                }
            }),
        );
        scope
    }
}

#[async_trait]
impl ExecutionEnvironment for EmbeddedEnvironment {
    type Handle = EmbeddedPage;

    async fn load_document(
        &self,
        case: &Path,
        _timeout: Duration,
    ) -> Result<EmbeddedPage, EnvironmentError> {
        let document = self.documents.get(case).cloned().ok_or_else(|| {
            EnvironmentError::Navigation(format!("net::ERR_FILE_NOT_FOUND at {}", case.display()))
        })?;

        if !document.load_delay.is_zero() {
            tokio::time::sleep(document.load_delay).await;
        }

        let injected = Arc::new(AtomicUsize::new(0));
        Ok(EmbeddedPage {
            case: case.to_path_buf(),
            scope: self.fresh_scope(&injected),
            document,
            state: RecordingState::new(),
            table: Mutex::new(InterceptionTable::new()),
            bundle_loaded: AtomicBool::new(false),
            injected,
        })
    }

    async fn evaluate(
        &self,
        page: &EmbeddedPage,
        source: &str,
        _timeout: Duration,
    ) -> Result<Value, EnvironmentError> {
        if source == BUNDLE_SOURCE {
            page.bundle_loaded.store(true, Ordering::SeqCst);
            return Ok(Value::Null);
        }

        let entry = EntryPoint::parse(source).ok_or_else(|| {
            EnvironmentError::Evaluation("SyntaxError: unsupported source".to_string())
        })?;
        if !page.bundle_loaded.load(Ordering::SeqCst) {
            return Err(EnvironmentError::Evaluation(
                "ReferenceError: __sidefx is not defined".to_string(),
            ));
        }

        match entry {
            EntryPoint::Instrument => {
                let mut scope = page.scope.clone();
                let installed = page
                    .table
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .instrument(&mut scope, &page.state);
                Ok(json!(installed))
            }
            EntryPoint::StartRecording => {
                page.state.start();
                Ok(Value::Null)
            }
            EntryPoint::StopRecording => {
                page.state.stop();
                Ok(Value::Null)
            }
            EntryPoint::GetRecords => serde_json::to_value(page.state.records())
                .map_err(|e| EnvironmentError::Evaluation(e.to_string())),
            EntryPoint::RunScript(name) => {
                page.check_entry(&name).await?;
                page.run()?;
                Ok(Value::Null)
            }
            EntryPoint::RunAndRecordScript(name) => {
                page.check_entry(&name).await?;
                page.state.start();
                let start = Instant::now();
                let outcome = page.run();
                let duration = start.elapsed().as_secs_f64() * 1000.0;
                page.state.stop();
                outcome?;
                Ok(json!({"records": page.state.records(), "duration": duration}))
            }
        }
    }

    async fn inject_script(
        &self,
        page: &EmbeddedPage,
        script: &ScriptSource,
    ) -> Result<(), EnvironmentError> {
        if !script.is_empty_placeholder() {
            let effect = self.scripts.get(script).ok_or_else(|| {
                EnvironmentError::Injection(format!("cannot load script {script:?}"))
            })?;
            effect(&page.scope);
        }
        page.injected.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_context(&self, page: EmbeddedPage) {
        tracing::trace!(case = %page.case.display(), "closing page");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaseError;
    use crate::recorder::Recorder;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn case() -> PathBuf {
        PathBuf::from("/cases/0001.html")
    }

    fn document() -> EmbeddedDocument {
        EmbeddedDocument::calls(vec![
            (
                "globalThis.Document.prototype.getElementById",
                json!({}),
                vec![json!("htmlvar00001")],
            ),
            ("globalThis.String.prototype.includes", json!("version"), vec![json!("ver")]),
        ])
    }

    #[tokio::test]
    async fn test_recorder_roundtrip_in_embedded_page() {
        let env = EmbeddedEnvironment::new().with_document(case(), document());
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        let recorder = Recorder::new(&env, &page, TIMEOUT, "jsfuzzer");

        recorder.load_bundle().await.unwrap();
        assert!(recorder.instrument().await.unwrap() > 0);
        let run = recorder.run_and_record_script().await.unwrap();

        let names: Vec<_> = run.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "globalThis.Document.prototype.getElementById",
                "globalThis.String.prototype.includes"
            ]
        );
        assert_eq!(run.records[1].result, "true");
        assert!(run.duration >= 0.0);
        assert!(!page.state.is_recording());
        env.close_context(page).await;
    }

    #[tokio::test]
    async fn test_uninstrumented_page_records_nothing() {
        let env = EmbeddedEnvironment::new().with_document(case(), document());
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        let recorder = Recorder::new(&env, &page, TIMEOUT, "jsfuzzer");

        recorder.load_bundle().await.unwrap();
        let run = recorder.run_and_record_script().await.unwrap();
        assert!(run.records.is_empty());
    }

    #[tokio::test]
    async fn test_instrument_twice_wraps_nothing_new() {
        let env = EmbeddedEnvironment::new().with_document(case(), document());
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        let recorder = Recorder::new(&env, &page, TIMEOUT, "jsfuzzer");

        recorder.load_bundle().await.unwrap();
        recorder.instrument().await.unwrap();
        assert_eq!(recorder.instrument().await.unwrap(), 0);

        let run = recorder.run_and_record_script().await.unwrap();
        assert_eq!(run.records.len(), 2);
    }

    #[tokio::test]
    async fn test_entry_point_before_bundle_fails() {
        let env = EmbeddedEnvironment::new().with_document(case(), document());
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        let recorder = Recorder::new(&env, &page, TIMEOUT, "jsfuzzer");

        assert!(matches!(
            recorder.instrument().await,
            Err(CaseError::Environment(EnvironmentError::Evaluation(_)))
        ));
    }

    #[tokio::test]
    async fn test_throwing_entry_point() {
        let doc = EmbeddedDocument::new(|_| Err(Thrown::type_error("boom")));
        let env = EmbeddedEnvironment::new().with_document(case(), doc);
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        let recorder = Recorder::new(&env, &page, TIMEOUT, "jsfuzzer");

        recorder.load_bundle().await.unwrap();
        match recorder.run_and_record_script().await {
            Err(CaseError::EntryPoint(message)) => assert!(message.contains("boom")),
            other => panic!("Expected EntryPoint error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_entry_point_name() {
        let env = EmbeddedEnvironment::new().with_document(case(), document());
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        let recorder = Recorder::new(&env, &page, TIMEOUT, "main");

        recorder.load_bundle().await.unwrap();
        assert!(matches!(
            recorder.run_script().await,
            Err(CaseError::EntryPoint(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_document_is_navigation_error() {
        let env = EmbeddedEnvironment::new();
        let err = env
            .load_document(Path::new("/nope.html"), TIMEOUT)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EnvironmentError::Navigation(_)));
    }

    #[tokio::test]
    async fn test_injection_is_visible_to_host_apis() {
        let doc = EmbeddedDocument::calls(vec![(
            "globalThis.Document.prototype.getElementsByTagName",
            json!({}),
            vec![json!("script")],
        )]);
        let env = EmbeddedEnvironment::new().with_document(case(), doc);
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        env.inject_script(&page, &ScriptSource::empty()).await.unwrap();
        assert_eq!(page.injected_scripts(), 1);

        let recorder = Recorder::new(&env, &page, TIMEOUT, "jsfuzzer");
        recorder.load_bundle().await.unwrap();
        recorder.instrument().await.unwrap();
        let run = recorder.run_and_record_script().await.unwrap();
        assert_eq!(run.records[0].result, r#"{"length":1}"#);
    }

    #[tokio::test]
    async fn test_unregistered_script_fails_injection() {
        let env = EmbeddedEnvironment::new().with_document(case(), document());
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        let script = ScriptSource::Path(PathBuf::from("/scripts/unknown.js"));
        assert!(matches!(
            env.inject_script(&page, &script).await,
            Err(EnvironmentError::Injection(_))
        ));
    }

    #[tokio::test]
    async fn test_script_effect_changes_surface() {
        let script = ScriptSource::Inline("patch".to_string());
        let env = EmbeddedEnvironment::new()
            .with_document(case(), document())
            .with_script(script.clone(), |scope| {
                scope.define(
                    "globalThis.String.prototype.includes",
                    ApiFunction::native(|_, _| Ok(json!(false))),
                );
            });
        let page = env.load_document(&case(), TIMEOUT).await.unwrap();
        env.inject_script(&page, &script).await.unwrap();

        let recorder = Recorder::new(&env, &page, TIMEOUT, "jsfuzzer");
        recorder.load_bundle().await.unwrap();
        recorder.instrument().await.unwrap();
        let run = recorder.run_and_record_script().await.unwrap();
        assert_eq!(run.records[1].result, "false");
    }
}
