//! Recorder: makes every built-in API call of a page observable
//!
//! The page side is a fixed instrumentation bundle (`bundle.js`) evaluated
//! once per navigation. It exposes named entry points on
//! `globalThis.__sidefx`; [`Recorder`] invokes them by name through the
//! [`ExecutionEnvironment`] and decodes the JSON they return.
//!
//! Hosts that embed their own runtime use [`intercept`] directly: the same
//! wrapping semantics expressed as an interception table over an
//! [`intercept::Interceptable`] namespace.

pub mod intercept;
mod record;

pub use intercept::{
    ApiFunction, InstallError, Interceptable, InterceptionTable, RecordingState, Thrown,
};
pub use record::{
    canonicalize, canonicalize_arguments, ApiRecord, RecordedRun, ELISION_MARKER,
    MAX_SERIALIZED_LEN,
};

use crate::environment::{bounded, EnvironmentError, ExecutionEnvironment};
use crate::error::CaseError;
use serde_json::Value;
use std::time::Duration;

/// Page-side instrumentation bundle
pub const BUNDLE_SOURCE: &str = include_str!("bundle.js");

/// Global under which the bundle registers its entry points
pub const BUNDLE_GLOBAL: &str = "__sidefx";

/// Named operations exposed by the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    Instrument,
    StartRecording,
    StopRecording,
    GetRecords,
    /// Invoke the case's global entry point
    RunScript(String),
    /// Invoke the entry point with recording on; returns `{records, duration}`
    RunAndRecordScript(String),
}

impl EntryPoint {
    fn method(&self) -> &'static str {
        match self {
            EntryPoint::Instrument => "instrument",
            EntryPoint::StartRecording => "startRecording",
            EntryPoint::StopRecording => "stopRecording",
            EntryPoint::GetRecords => "getRecords",
            EntryPoint::RunScript(_) => "runScript",
            EntryPoint::RunAndRecordScript(_) => "runAndRecordScript",
        }
    }

    /// Source text that invokes this entry point inside the page
    pub fn invocation(&self) -> String {
        let argument = match self {
            EntryPoint::RunScript(name) | EntryPoint::RunAndRecordScript(name) => {
                // A JSON string literal is a valid JS string literal
                serde_json::to_string(name).unwrap_or_else(|_| "\"\"".to_string())
            }
            _ => String::new(),
        };
        format!("globalThis.{}.{}({})", BUNDLE_GLOBAL, self.method(), argument)
    }

    /// Inverse of [`EntryPoint::invocation`], for hosts that dispatch natively
    pub fn parse(source: &str) -> Option<Self> {
        let prefix = format!("globalThis.{}.", BUNDLE_GLOBAL);
        let call = source.trim().strip_prefix(&prefix)?.strip_suffix(')')?;
        let (method, argument) = call.split_once('(')?;

        let name = || serde_json::from_str::<String>(argument).ok();
        match (method, argument.is_empty()) {
            ("instrument", true) => Some(EntryPoint::Instrument),
            ("startRecording", true) => Some(EntryPoint::StartRecording),
            ("stopRecording", true) => Some(EntryPoint::StopRecording),
            ("getRecords", true) => Some(EntryPoint::GetRecords),
            ("runScript", false) => name().map(EntryPoint::RunScript),
            ("runAndRecordScript", false) => name().map(EntryPoint::RunAndRecordScript),
            _ => None,
        }
    }
}

/// Drives the bundle inside one loaded page
pub struct Recorder<'a, E: ExecutionEnvironment + ?Sized> {
    env: &'a E,
    page: &'a E::Handle,
    timeout: Duration,
    entry_point: &'a str,
}

impl<'a, E: ExecutionEnvironment + ?Sized> Recorder<'a, E> {
    pub fn new(env: &'a E, page: &'a E::Handle, timeout: Duration, entry_point: &'a str) -> Self {
        Recorder {
            env,
            page,
            timeout,
            entry_point,
        }
    }

    /// Evaluate the bundle; must precede every other operation on a fresh page.
    pub async fn load_bundle(&self) -> Result<(), CaseError> {
        self.evaluate("load_bundle", BUNDLE_SOURCE).await?;
        Ok(())
    }

    /// Wrap the page's built-ins; returns how many members were wrapped.
    pub async fn instrument(&self) -> Result<u64, CaseError> {
        let value = self.call(EntryPoint::Instrument).await?;
        Ok(value.as_u64().unwrap_or(0))
    }

    pub async fn start_recording(&self) -> Result<(), CaseError> {
        self.call(EntryPoint::StartRecording).await.map(drop)
    }

    pub async fn stop_recording(&self) -> Result<(), CaseError> {
        self.call(EntryPoint::StopRecording).await.map(drop)
    }

    /// Current buffer contents; the buffer is not cleared.
    pub async fn get_records(&self) -> Result<Vec<ApiRecord>, CaseError> {
        let value = self.call(EntryPoint::GetRecords).await?;
        serde_json::from_value(value).map_err(|e| CaseError::MalformedRun(e.to_string()))
    }

    pub async fn run_script(&self) -> Result<(), CaseError> {
        self.call(EntryPoint::RunScript(self.entry_point.to_string()))
            .await
            .map(drop)
    }

    /// Run the entry point once with recording on and measure it.
    pub async fn run_and_record_script(&self) -> Result<RecordedRun, CaseError> {
        let value = self
            .call(EntryPoint::RunAndRecordScript(self.entry_point.to_string()))
            .await?;
        RecordedRun::from_value(value)
    }

    async fn call(&self, entry: EntryPoint) -> Result<Value, CaseError> {
        let runs_case = matches!(
            entry,
            EntryPoint::RunScript(_) | EntryPoint::RunAndRecordScript(_)
        );
        match self.evaluate(entry.method(), &entry.invocation()).await {
            // A throw from the case's own code is reported as such
            Err(EnvironmentError::Evaluation(message)) if runs_case => {
                Err(CaseError::EntryPoint(message))
            }
            other => other.map_err(CaseError::from),
        }
    }

    async fn evaluate(
        &self,
        operation: &'static str,
        source: &str,
    ) -> Result<Value, EnvironmentError> {
        bounded(
            operation,
            self.timeout,
            self.env.evaluate(self.page, source, self.timeout),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_roundtrip() {
        let entries = [
            EntryPoint::Instrument,
            EntryPoint::StartRecording,
            EntryPoint::StopRecording,
            EntryPoint::GetRecords,
            EntryPoint::RunScript("jsfuzzer".into()),
            EntryPoint::RunAndRecordScript("weird \"name\"".into()),
        ];
        for entry in entries {
            assert_eq!(EntryPoint::parse(&entry.invocation()), Some(entry));
        }
    }

    #[test]
    fn test_invocation_text() {
        assert_eq!(
            EntryPoint::RunAndRecordScript("jsfuzzer".into()).invocation(),
            r#"globalThis.__sidefx.runAndRecordScript("jsfuzzer")"#
        );
        assert_eq!(
            EntryPoint::Instrument.invocation(),
            "globalThis.__sidefx.instrument()"
        );
    }

    #[test]
    fn test_parse_rejects_foreign_source() {
        assert_eq!(EntryPoint::parse("window.jsfuzzer()"), None);
        assert_eq!(EntryPoint::parse("globalThis.__sidefx.instrument(1)"), None);
        assert_eq!(EntryPoint::parse("globalThis.__sidefx.runScript()"), None);
        assert_eq!(EntryPoint::parse("globalThis.__sidefx.reset()"), None);
    }

    #[test]
    fn test_bundle_exposes_every_entry_point() {
        assert!(BUNDLE_SOURCE.contains(BUNDLE_GLOBAL));
        for method in [
            "instrument",
            "startRecording",
            "stopRecording",
            "getRecords",
            "runScript",
            "runAndRecordScript",
        ] {
            assert!(BUNDLE_SOURCE.contains(method), "bundle lacks {method}");
        }
        assert!(BUNDLE_SOURCE.contains(ELISION_MARKER));
    }
}
