//! Web search and full-page extraction capabilities (Tavily-style API).

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::SearchConfig;
use crate::registry::{Capability, CapabilityError, NamedInputs, timeout_from_params, with_timeout};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_EXTRACT_URLS: usize = 20;

/// `web.search`: ad-hoc search with a synthesized answer.
///
/// Inputs: `query`. Params: `max_results`, `timeout_ms`.
/// Output: `{"results": [{url, title, content}], "answer": ...}`.
pub struct WebSearch {
    client: reqwest::Client,
    config: SearchConfig,
}

impl WebSearch {
    pub fn new(client: reqwest::Client, config: SearchConfig) -> Self {
        Self { client, config }
    }

    async fn search(&self, query: &str, max_results: u64) -> Result<Value, CapabilityError> {
        let body = json!({
            "api_key": self.config.api_key,
            "query": query,
            "max_results": max_results,
            "search_depth": "basic",
            "include_answer": "advanced",
            "include_raw_content": false,
        });
        let response = self
            .client
            .post(format!("{}/search", self.config.base_url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CapabilityError::Search {
                message: format!("search returned {}", response.status()),
            });
        }
        let payload: Value = response.json().await?;
        Ok(json!({
            "results": payload.get("results").cloned().unwrap_or(json!([])),
            "answer": payload.get("answer").cloned().unwrap_or(Value::Null),
        }))
    }
}

#[async_trait]
impl Capability for WebSearch {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let query = inputs.require_str("query")?;
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .unwrap_or(u64::from(self.config.max_results));
        debug!(query, max_results, "web search");
        let ms = timeout_from_params(params, DEFAULT_TIMEOUT_MS);
        with_timeout("web.search", ms, self.search(query, max_results)).await
    }
}

/// `web.extract`: full-text extraction for a set of URLs.
///
/// Inputs: `urls` (max 20). Params: `timeout_ms`.
/// Output: `{"results": [{url, raw_content}], "failed_results": [{url, error}]}`.
pub struct WebExtract {
    client: reqwest::Client,
    config: SearchConfig,
}

impl WebExtract {
    pub fn new(client: reqwest::Client, config: SearchConfig) -> Self {
        Self { client, config }
    }

    async fn extract(&self, urls: Vec<String>) -> Result<Value, CapabilityError> {
        let body = json!({
            "api_key": self.config.api_key,
            "urls": urls,
            "extract_depth": "basic",
            "format": "markdown",
        });
        let response = self
            .client
            .post(format!("{}/extract", self.config.base_url))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CapabilityError::Extraction {
                message: format!("extract returned {}", response.status()),
            });
        }
        let payload: Value = response.json().await?;
        Ok(json!({
            "results": payload.get("results").cloned().unwrap_or(json!([])),
            "failed_results": payload.get("failed_results").cloned().unwrap_or(json!([])),
        }))
    }
}

#[async_trait]
impl Capability for WebExtract {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let urls = inputs.str_items("urls")?;
        if urls.is_empty() {
            return Err(CapabilityError::MissingInput {
                what: "urls (non-empty array)".into(),
            });
        }
        if urls.len() > MAX_EXTRACT_URLS {
            return Err(CapabilityError::Extraction {
                message: format!("at most {MAX_EXTRACT_URLS} URLs per extract request"),
            });
        }
        debug!(count = urls.len(), "web extract");
        let ms = timeout_from_params(params, DEFAULT_TIMEOUT_MS);
        with_timeout("web.extract", ms, self.extract(urls)).await
    }
}
