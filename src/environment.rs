//! External execution environment
//!
//! The oracle never drives a browser itself. Everything it needs from the
//! outside world is this narrow surface: load a document, evaluate source
//! inside it and get JSON back, attach a script, and release the page.
//! Each loaded document is an isolated context with its own recording state.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Content attached to a page before measurement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptSource {
    /// Script file on disk (the candidate script under test)
    Path(PathBuf),
    /// Inline script text
    Inline(String),
}

impl ScriptSource {
    /// Placeholder tag attached in baseline runs.
    ///
    /// Some host APIs (e.g. `document.all.length`) report different values
    /// depending on whether any script tag was injected, so the baseline run
    /// must carry a tag too.
    pub fn empty() -> Self {
        ScriptSource::Inline("() => { return; }".to_string())
    }

    pub fn is_empty_placeholder(&self) -> bool {
        matches!(self, ScriptSource::Inline(body) if body == "() => { return; }")
    }
}

/// Failures reported by an execution environment
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvironmentError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("script injection failed: {0}")]
    Injection(String),
}

impl EnvironmentError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EnvironmentError::Timeout { .. })
    }
}

/// Run one page interaction under an explicit deadline.
///
/// Exceeding `after` fails the interaction with [`EnvironmentError::Timeout`],
/// whatever the environment itself does with the timeout it was handed.
pub async fn bounded<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, EnvironmentError>
where
    F: Future<Output = Result<T, EnvironmentError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(EnvironmentError::Timeout { operation, after }),
    }
}

/// Capability to run case documents in isolated page contexts
///
/// Implementations are shared read-only across concurrent cases; every call
/// that touches page state goes through the per-page `Handle`.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Live page context for one loaded document
    type Handle: Send + Sync;

    /// Load the document identified by `case` and wait (bounded) until ready.
    async fn load_document(
        &self,
        case: &Path,
        timeout: Duration,
    ) -> Result<Self::Handle, EnvironmentError>;

    /// Evaluate `source` inside the page and return its JSON result.
    async fn evaluate(
        &self,
        page: &Self::Handle,
        source: &str,
        timeout: Duration,
    ) -> Result<Value, EnvironmentError>;

    /// Attach a script before further evaluation happens.
    async fn inject_script(
        &self,
        page: &Self::Handle,
        script: &ScriptSource,
    ) -> Result<(), EnvironmentError>;

    /// Release the page.
    async fn close_context(&self, page: Self::Handle);
}

/// Pre-measurement hook run against a page after the candidate script is attached
#[async_trait]
pub trait Scenario<E: ExecutionEnvironment + ?Sized>: Send + Sync {
    async fn prepare(&self, env: &E, page: &E::Handle) -> Result<(), EnvironmentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_placeholder_roundtrip() {
        let empty = ScriptSource::empty();
        assert!(empty.is_empty_placeholder());
        assert!(!ScriptSource::Inline("console.log(1)".to_string()).is_empty_placeholder());
        assert!(!ScriptSource::Path(PathBuf::from("/tmp/x.js")).is_empty_placeholder());
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, EnvironmentError>(())
        };
        let err = bounded("evaluate", Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EnvironmentError::Timeout {
                operation: "evaluate",
                after: Duration::from_millis(10)
            }
        );
    }

    #[tokio::test]
    async fn test_bounded_passes_inner_error_through() {
        let failing = async { Err::<(), _>(EnvironmentError::Navigation("gone".into())) };
        let err = bounded("load_document", Duration::from_secs(1), failing)
            .await
            .unwrap_err();
        assert_eq!(err, EnvironmentError::Navigation("gone".into()));
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let timeout = EnvironmentError::Timeout {
            operation: "load_document",
            after: Duration::from_millis(2000),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.to_string().contains("load_document"));
        assert!(!EnvironmentError::Navigation("net::ERR_FILE_NOT_FOUND".into()).is_timeout());
    }
}
