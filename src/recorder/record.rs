// Observed API calls and their canonical serialization
//
// Every field of an ApiRecord is a canonical string so that two records can be
// compared by plain equality, and so that a trace dumps to one line per call.
// Values that cannot be serialized faithfully keep their slot in the trace and
// carry the elision marker instead.

use crate::error::CaseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder for values that were too large (or, page-side, circular)
pub const ELISION_MARKER: &str = "[elided]";

/// Serialized fields longer than this are elided
pub const MAX_SERIALIZED_LEN: usize = 64 * 1024;

/// One observed call to an intercepted API member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecord {
    /// Fully qualified dotted path, e.g. `globalThis.String.prototype.includes`
    pub name: String,
    /// Canonical JSON of the argument list, in call order
    pub arguments_list: String,
    /// Canonical JSON of the receiver
    pub bound_this: String,
    /// Canonical JSON of the return value (`throw <value>` when the call threw)
    pub result: String,
}

impl ApiRecord {
    pub fn new(
        name: impl Into<String>,
        arguments_list: impl Into<String>,
        bound_this: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        ApiRecord {
            name: name.into(),
            arguments_list: arguments_list.into(),
            bound_this: bound_this.into(),
            result: result.into(),
        }
    }

    /// Capture the call side of a record; the result is filled in after delegation.
    pub fn capture(name: &str, this: &Value, args: &[Value]) -> Self {
        ApiRecord {
            name: name.to_string(),
            arguments_list: canonicalize_arguments(args),
            bound_this: canonicalize(this),
            result: String::new(),
        }
    }
}

/// Canonical string form of a value.
///
/// Object keys come out sorted (serde_json's default map is ordered), so
/// structurally equal values always serialize identically.
pub fn canonicalize(value: &Value) -> String {
    match serde_json::to_string(value) {
        Ok(text) if text.len() <= MAX_SERIALIZED_LEN => text,
        _ => ELISION_MARKER.to_string(),
    }
}

pub fn canonicalize_arguments(args: &[Value]) -> String {
    match serde_json::to_string(args) {
        Ok(text) if text.len() <= MAX_SERIALIZED_LEN => text,
        _ => ELISION_MARKER.to_string(),
    }
}

/// Records and elapsed wall time of one entry-point invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRun {
    pub records: Vec<ApiRecord>,
    /// Milliseconds
    pub duration: f64,
}

impl RecordedRun {
    /// Decode the payload returned by `runAndRecordScript`.
    pub fn from_value(value: Value) -> Result<Self, CaseError> {
        let run: RecordedRun =
            serde_json::from_value(value).map_err(|e| CaseError::MalformedRun(e.to_string()))?;
        if !run.duration.is_finite() || run.duration < 0.0 {
            return Err(CaseError::MalformedRun(format!(
                "duration must be a non-negative number, got {}",
                run.duration
            )));
        }
        Ok(run)
    }
}
