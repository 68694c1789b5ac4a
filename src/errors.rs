//! Structured failure records shared by the executor and the pipelines.
//!
//! A node that fails during a graph run produces a [`NodeFailure`]: a
//! timestamped record with a message/cause chain and optional structured
//! details. The same [`FailureDetail`] shape is what a suppressed
//! capability error serializes into (`{"onError": {...}}`), so graphs can
//! branch on an error payload without losing its structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A message/cause/details chain describing one failure.
///
/// # Examples
///
/// ```
/// use podweave::errors::FailureDetail;
/// use serde_json::json;
///
/// let detail = FailureDetail::msg("TTS request failed")
///     .with_cause(FailureDetail::msg("HTTP 429"))
///     .with_details(json!({"voice": "shimmer"}));
/// assert_eq!(detail.message, "TTS request failed");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<FailureDetail>>,
    #[serde(default)]
    pub details: Value,
}

impl Default for FailureDetail {
    fn default() -> Self {
        FailureDetail {
            message: String::new(),
            cause: None,
            details: Value::Null,
        }
    }
}

impl std::fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FailureDetail {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl FailureDetail {
    pub fn msg<M: Into<String>>(m: M) -> Self {
        FailureDetail {
            message: m.into(),
            cause: None,
            details: Value::Null,
        }
    }

    pub fn with_cause(mut self, cause: FailureDetail) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// The `{"onError": {...}}` output a suppressed capability error
    /// resolves to, letting downstream nodes branch on the failure.
    #[must_use]
    pub fn to_on_error(&self) -> Value {
        json!({ "onError": self })
    }
}

/// One node-level failure collected during a graph run.
///
/// Node ids are scoped: failures inside nested runs are reported as
/// `"subgraph.inner"` and map fan-out failures as `"map[3].inner"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeFailure {
    #[serde(default = "Utc::now")]
    pub when: DateTime<Utc>,
    pub node: String,
    pub error: FailureDetail,
}

impl NodeFailure {
    pub fn new<S: Into<String>>(node: S, error: FailureDetail) -> Self {
        Self {
            when: Utc::now(),
            node: node.into(),
            error,
        }
    }

    /// Re-scope a failure that happened inside a nested run.
    #[must_use]
    pub fn scoped(mut self, prefix: &str) -> Self {
        self.node = format!("{prefix}.{}", self.node);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_error_shape() {
        let detail = FailureDetail::msg("boom").with_cause(FailureDetail::msg("root"));
        let v = detail.to_on_error();
        assert_eq!(v["onError"]["message"], "boom");
        assert_eq!(v["onError"]["cause"]["message"], "root");
    }

    #[test]
    fn scoping_prefixes_node_ids() {
        let f = NodeFailure::new("tts", FailureDetail::msg("x")).scoped("synthesize[2]");
        assert_eq!(f.node, "synthesize[2].tts");
    }

    #[test]
    fn error_source_chain() {
        let detail = FailureDetail::msg("outer").with_cause(FailureDetail::msg("inner"));
        let src = std::error::Error::source(&detail).expect("cause");
        assert_eq!(src.to_string(), "inner");
    }
}
