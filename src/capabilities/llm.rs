//! Chat-completion capability over an OpenAI-compatible API.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::LlmConfig;
use crate::registry::{Capability, CapabilityError, NamedInputs, timeout_from_params, with_timeout};

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// `llm.complete`: chat completion, optionally schema-constrained.
///
/// Inputs: `messages` (array of `{role, content}`), optional `prompt`
/// appended as a trailing user message. Params: `model`,
/// `response_format` (a JSON-schema response format object), `tools`
/// (callable tool definitions), `timeout_ms`.
///
/// Output: `{"text": ...}` for a final answer, or
/// `{"tool_calls": [...]}` when the model requests a tool invocation.
pub struct LlmComplete {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmComplete {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    async fn complete(&self, body: Value) -> Result<Value, CapabilityError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Provider {
                provider: "llm",
                message: format!("{status}: {text}"),
            });
        }

        let payload: Value = response.json().await?;
        let message = &payload["choices"][0]["message"];
        if let Some(calls) = message.get("tool_calls").filter(|c| !c.is_null()) {
            return Ok(json!({"tool_calls": calls}));
        }
        let text = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if text.is_empty() {
            return Err(CapabilityError::Provider {
                provider: "llm",
                message: "completion returned neither content nor tool calls".into(),
            });
        }
        Ok(json!({"text": text}))
    }
}

#[async_trait]
impl Capability for LlmComplete {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let mut messages = inputs
            .get("messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if let Some(prompt) = inputs.opt_str("prompt") {
            messages.push(json!({"role": "user", "content": prompt}));
        }
        if messages.is_empty() {
            return Err(CapabilityError::MissingInput {
                what: "messages or prompt".into(),
            });
        }

        let model = params
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.model);
        let mut body = json!({"model": model, "messages": messages});
        if let Some(format) = params.get("response_format").filter(|f| !f.is_null()) {
            body["response_format"] = format.clone();
        }
        if let Some(tools) = params.get("tools").filter(|t| !t.is_null()) {
            body["tools"] = tools.clone();
        }

        debug!(model, messages = messages.len(), "requesting completion");
        let ms = timeout_from_params(params, DEFAULT_TIMEOUT_MS);
        with_timeout("llm.complete", ms, self.complete(body)).await
    }
}

/// The structured-output format constraining script composition:
/// `{"scripts": [{"speaker", "text"}]}`.
pub fn script_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "podcast",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "scripts": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "speaker": {"type": "string"},
                                "text": {"type": "string"}
                            },
                            "required": ["speaker", "text"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["scripts"],
                "additionalProperties": false
            }
        }
    })
}

/// Structured-output format for the feed-vs-search triage verdict.
pub fn triage_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "triage",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "rss_need": {"type": "boolean"},
                    "field": {
                        "type": "string",
                        "enum": [
                            "general", "social", "technology", "politics",
                            "economy", "world", "sports", "entertainment"
                        ]
                    },
                    "keywords": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["rss_need", "field", "keywords"],
                "additionalProperties": false
            }
        }
    })
}

/// Structured-output format for web search query formulation.
pub fn query_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "web_search_query",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"],
                "additionalProperties": false
            }
        }
    })
}
