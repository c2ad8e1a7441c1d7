//! Interception table
//!
//! Instead of patching shared prototypes in place, instrumentation builds an
//! explicit table from member path to `{original, wrapper}` for one execution
//! context. The context owns its `RecordingState` (gate + buffer), so nothing
//! is shared between cases.
//!
//! Any namespace that can hand out its current member and accept a
//! replacement implements [`Interceptable`]. Where a host cannot offer that,
//! only calls crossing its embedding boundary can be recorded.

use super::record::{canonicalize, ApiRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// A thrown value, propagated unchanged through wrappers
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown(pub Value);

impl Thrown {
    pub fn type_error(message: impl Into<String>) -> Self {
        Thrown(serde_json::json!({"name": "TypeError", "message": message.into()}))
    }
}

/// Native implementation signature: `(this, arguments) -> result`
pub type NativeCall = dyn Fn(&Value, &[Value]) -> Result<Value, Thrown> + Send + Sync;

/// Callable API member
///
/// The `instrumented` flag is the marker that makes instrumentation idempotent.
#[derive(Clone)]
pub struct ApiFunction {
    call: Arc<NativeCall>,
    instrumented: bool,
}

impl ApiFunction {
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, Thrown> + Send + Sync + 'static,
    {
        ApiFunction {
            call: Arc::new(f),
            instrumented: false,
        }
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, Thrown> {
        (self.call)(this, args)
    }

    pub fn is_instrumented(&self) -> bool {
        self.instrumented
    }
}

impl fmt::Debug for ApiFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiFunction")
            .field("instrumented", &self.instrumented)
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("member {0} is not configurable")]
    NonConfigurable(String),

    #[error("unknown member {0}")]
    Unknown(String),
}

/// A namespace whose members can be looked up and replaced
pub trait Interceptable {
    /// Fully qualified paths of all function-valued members
    fn paths(&self) -> Vec<String>;

    /// Member currently installed at `path`
    fn get_original(&self, path: &str) -> Option<ApiFunction>;

    /// Replace the member at `path`
    fn install(&mut self, path: &str, wrapper: ApiFunction) -> Result<(), InstallError>;
}

/// Recording gate and buffer owned by one execution context
#[derive(Debug, Clone, Default)]
pub struct RecordingState {
    enabled: Arc<AtomicBool>,
    buffer: Arc<Mutex<Vec<ApiRecord>>>,
}

impl RecordingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Snapshot of the buffer; the buffer is not cleared.
    pub fn records(&self) -> Vec<ApiRecord> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reserve the next slot so records stay in call order even when the
    /// original implementation makes nested intercepted calls.
    fn begin(&self, record: ApiRecord) -> usize {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.push(record);
        buffer.len() - 1
    }

    fn complete(&self, slot: usize, result: String) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = buffer.get_mut(slot) {
            record.result = result;
        }
    }
}

fn recording_wrapper(path: String, original: ApiFunction, state: RecordingState) -> ApiFunction {
    let call = move |this: &Value, args: &[Value]| {
        if !state.is_recording() {
            return original.call(this, args);
        }

        let slot = state.begin(ApiRecord::capture(&path, this, args));
        let outcome = original.call(this, args);
        let result = match &outcome {
            Ok(value) => canonicalize(value),
            Err(Thrown(value)) => format!("throw {}", canonicalize(value)),
        };
        state.complete(slot, result);
        outcome
    };

    ApiFunction {
        call: Arc::new(call),
        instrumented: true,
    }
}

/// Installed interception: the member before wrapping and its wrapper
#[derive(Debug, Clone)]
pub struct Interception {
    pub original: ApiFunction,
    pub wrapper: ApiFunction,
}

/// Path → interception for one execution context
#[derive(Debug, Default)]
pub struct InterceptionTable {
    entries: BTreeMap<String, Interception>,
    skipped: Vec<String>,
}

impl InterceptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap every member of `target` that is not already instrumented.
    ///
    /// Members that refuse replacement are skipped. Returns the number of
    /// members wrapped by this call; a second call on the same target wraps
    /// nothing.
    pub fn instrument<T>(&mut self, target: &mut T, state: &RecordingState) -> usize
    where
        T: Interceptable + ?Sized,
    {
        let mut installed = 0;

        for path in target.paths() {
            let Some(original) = target.get_original(&path) else {
                continue;
            };
            if original.is_instrumented() {
                continue;
            }

            let wrapper = recording_wrapper(path.clone(), original.clone(), state.clone());
            match target.install(&path, wrapper.clone()) {
                Ok(()) => {
                    self.entries
                        .insert(path, Interception { original, wrapper });
                    installed += 1;
                }
                Err(e) => {
                    tracing::debug!(member = %path, error = %e, "skipping member");
                    if !self.skipped.contains(&path) {
                        self.skipped.push(path);
                    }
                }
            }
        }

        installed
    }

    pub fn original(&self, path: &str) -> Option<&ApiFunction> {
        self.entries.get(path).map(|entry| &entry.original)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Members that could not be replaced
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}
