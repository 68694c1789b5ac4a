//! Speech synthesis over an OpenAI-compatible speech endpoint.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::TtsConfig;
use crate::registry::{Capability, CapabilityError, NamedInputs, timeout_from_params, with_timeout};

const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// `tts.synthesize`: render one line of text to encoded audio bytes.
///
/// Inputs: `text`, `voice`. Params: `model`, `instructions` (only passed
/// for models that accept them), `timeout_ms`.
///
/// Output: `{"buffer": <base64>}`. An empty response body is a synthesis
/// error; graphs with a fallback branch can suppress it at the node level.
pub struct TtsSynthesize {
    client: reqwest::Client,
    config: TtsConfig,
}

impl TtsSynthesize {
    pub fn new(client: reqwest::Client, config: TtsConfig) -> Self {
        Self { client, config }
    }

    async fn synthesize(&self, body: Value) -> Result<Value, CapabilityError> {
        let response = self
            .client
            .post(format!("{}/audio/speech", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CapabilityError::Tts {
                message: format!("speech endpoint returned {}", response.status()),
            });
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(CapabilityError::Tts {
                message: "speech endpoint returned no audio".into(),
            });
        }
        Ok(json!({"buffer": BASE64.encode(&bytes)}))
    }
}

#[async_trait]
impl Capability for TtsSynthesize {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let text = inputs.require_str("text")?;
        let voice = inputs.opt_str("voice").unwrap_or("shimmer");
        let model = params
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.model);

        let mut body = json!({"model": model, "voice": voice, "input": text});
        // Instruction steering is only understood by the steerable models.
        if model == "gpt-4o-mini-tts" {
            if let Some(instructions) = params.get("instructions").and_then(Value::as_str) {
                body["instructions"] = json!(instructions);
            }
        }

        debug!(voice, model, chars = text.len(), "synthesizing line");
        let ms = timeout_from_params(params, DEFAULT_TIMEOUT_MS);
        with_timeout("tts.synthesize", ms, self.synthesize(body)).await
    }
}
