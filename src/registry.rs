//! Capability registry: the boundary between the graph engine and the
//! outside world.
//!
//! A [`Capability`] is an asynchronous operation over named JSON inputs:
//! an LLM call, a web search, a TTS synthesis, an ffmpeg run. Capabilities
//! are free to perform side effects but never touch executor state: they
//! return a value or fail with a [`CapabilityError`]. The
//! [`CapabilityRegistry`] maps symbolic names from graph specs to
//! implementations, which is also what makes pipelines testable; tests
//! register doubles under the same names.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::errors::FailureDetail;

/// Resolved inputs handed to a capability invocation.
#[derive(Clone, Debug, Default)]
pub struct NamedInputs(FxHashMap<String, Value>);

impl NamedInputs {
    pub fn new(map: FxHashMap<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// A required input; absent or `null` is a [`CapabilityError::MissingInput`].
    pub fn require(&self, name: &str) -> Result<&Value, CapabilityError> {
        match self.0.get(name) {
            Some(v) if !v.is_null() => Ok(v),
            _ => Err(CapabilityError::MissingInput {
                what: name.to_string(),
            }),
        }
    }

    pub fn require_str(&self, name: &str) -> Result<&str, CapabilityError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| CapabilityError::MissingInput {
                what: format!("{name} (expected string)"),
            })
    }

    pub fn require_array(&self, name: &str) -> Result<&Vec<Value>, CapabilityError> {
        self.require(name)?
            .as_array()
            .ok_or_else(|| CapabilityError::MissingInput {
                what: format!("{name} (expected array)"),
            })
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Consume the inputs as a plain map.
    #[must_use]
    pub fn into_inner(self) -> FxHashMap<String, Value> {
        self.0
    }

    /// String elements of an array input; non-strings are ignored.
    pub fn str_items(&self, name: &str) -> Result<Vec<String>, CapabilityError> {
        Ok(self
            .require_array(name)?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }
}

impl FromIterator<(String, Value)> for NamedInputs {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Errors produced by capability invocations.
///
/// The variants mirror the external concerns a graph may want to branch
/// on: a network deadline, a synthesis failure with a usable fallback, an
/// extraction that came back empty. [`detail`](Self::detail) flattens any
/// variant into the structured record used by suppression and `errors()`.
#[derive(Debug, Error, Diagnostic)]
pub enum CapabilityError {
    #[error("unknown capability: {name}")]
    #[diagnostic(
        code(podweave::registry::unknown_capability),
        help("Register the capability before referencing it from a graph.")
    )]
    Unknown { name: String },

    #[error("missing expected input: {what}")]
    #[diagnostic(code(podweave::capability::missing_input))]
    MissingInput { what: String },

    #[error("{capability} timed out after {elapsed_ms}ms")]
    #[diagnostic(code(podweave::capability::timeout))]
    Timeout { capability: String, elapsed_ms: u64 },

    #[error("speech synthesis failed: {message}")]
    #[diagnostic(code(podweave::capability::tts))]
    Tts { message: String },

    #[error("web search failed: {message}")]
    #[diagnostic(code(podweave::capability::search))]
    Search { message: String },

    #[error("content extraction failed: {message}")]
    #[diagnostic(code(podweave::capability::extraction))]
    Extraction { message: String },

    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(podweave::capability::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("object store error: {message}")]
    #[diagnostic(code(podweave::capability::store))]
    Store { message: String },

    #[error("{program} exited abnormally: {message}")]
    #[diagnostic(code(podweave::capability::subprocess))]
    Subprocess { program: String, message: String },

    #[error(transparent)]
    #[diagnostic(code(podweave::capability::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(podweave::capability::http))]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    #[diagnostic(code(podweave::capability::json))]
    Json(#[from] serde_json::Error),
}

impl CapabilityError {
    /// Flatten into the structured failure record used for `errors()` and
    /// suppressed `{"onError": {...}}` outputs.
    #[must_use]
    pub fn detail(&self) -> FailureDetail {
        let mut detail = FailureDetail::msg(self.to_string());
        if let Some(source) = std::error::Error::source(self) {
            detail = detail.with_cause(FailureDetail::msg(source.to_string()));
        }
        detail
    }
}

/// An asynchronous, side-effecting operation invocable from a graph node.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, inputs: NamedInputs, params: &Value)
    -> Result<Value, CapabilityError>;
}

/// Name → capability lookup, composed once at startup and shared read-only
/// across concurrent runs.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    entries: FxHashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.entries.insert(name.into(), capability);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, CapabilityError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| CapabilityError::Unknown {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &names)
            .finish()
    }
}

/// Effective timeout for a network-bound capability: an explicit
/// `timeout_ms` param overrides the capability's default.
#[must_use]
pub fn timeout_from_params(params: &Value, default_ms: u64) -> u64 {
    params
        .get("timeout_ms")
        .and_then(Value::as_u64)
        .unwrap_or(default_ms)
}

/// Run `fut` under a deadline, mapping expiry to [`CapabilityError::Timeout`].
pub async fn with_timeout<T, F>(
    capability: &str,
    ms: u64,
    fut: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    match tokio::time::timeout(Duration::from_millis(ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            capability: capability.to_string(),
            elapsed_ms: ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        async fn invoke(
            &self,
            inputs: NamedInputs,
            _params: &Value,
        ) -> Result<Value, CapabilityError> {
            Ok(inputs.require("value")?.clone())
        }
    }

    #[tokio::test]
    async fn resolve_and_invoke() {
        let mut registry = CapabilityRegistry::new();
        registry.register("echo", Arc::new(Echo));

        let cap = registry.resolve("echo").unwrap();
        let inputs: NamedInputs = [("value".to_string(), json!(42))].into_iter().collect();
        let out = cap.invoke(inputs, &Value::Null).await.unwrap();
        assert_eq!(out, json!(42));
    }

    #[test]
    fn unknown_capability() {
        let registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.resolve("nope"),
            Err(CapabilityError::Unknown { .. })
        ));
    }

    #[test]
    fn missing_input_includes_name() {
        let inputs = NamedInputs::default();
        let err = inputs.require("text").unwrap_err();
        assert!(err.to_string().contains("text"));
        // Null counts as absent.
        let inputs: NamedInputs = [("text".to_string(), Value::Null)].into_iter().collect();
        assert!(inputs.require("text").is_err());
    }

    #[tokio::test]
    async fn timeout_maps_to_capability_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!(1))
        };
        let err = with_timeout("llm.complete", 10, slow).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Timeout { elapsed_ms: 10, .. }));
    }

    #[test]
    fn params_override_default_timeout() {
        assert_eq!(timeout_from_params(&json!({"timeout_ms": 250}), 1000), 250);
        assert_eq!(timeout_from_params(&json!({}), 1000), 1000);
        assert_eq!(timeout_from_params(&Value::Null, 1000), 1000);
    }
}
