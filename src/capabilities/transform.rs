//! Named data-shaping capabilities.
//!
//! The graphs never embed anonymous reshaping logic; every shaping step is
//! one of these small, individually testable capabilities registered under
//! a `transform.*` name.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::config::FeedCategory;
use crate::message::Message;
use crate::pipelines::prompts::context_prompt;
use crate::registry::{Capability, CapabilityError, NamedInputs};
use crate::utils::json_ext::value_at_path;

fn results_items(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

/// `transform.collect_urls`: source references from search, extraction,
/// or article results: `[{url, title}]`.
pub struct CollectUrls;

#[async_trait]
impl Capability for CollectUrls {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let results = inputs.require("results")?;
        let urls: Vec<Value> = results_items(results)
            .iter()
            .filter_map(|item| {
                let url = item
                    .get("url")
                    .or_else(|| item.get("link"))
                    .and_then(Value::as_str)?;
                let title = item.get("title").and_then(Value::as_str).unwrap_or("");
                Some(json!({"url": url, "title": title}))
            })
            .collect();
        Ok(Value::Array(urls))
    }
}

/// `transform.digest`: flatten retrieval results into a context string,
/// pulling the body from the field named in params (`raw_content`,
/// `body_text`, ...).
pub struct DigestResults;

#[async_trait]
impl Capability for DigestResults {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let field = params.get("field").and_then(Value::as_str).unwrap_or("raw_content");
        let results = inputs.require("results")?;
        let digest = results_items(results)
            .iter()
            .map(|item| {
                json!({
                    "title": item.get("title").cloned().unwrap_or(Value::Null),
                    "content": item.get(field).cloned().unwrap_or(Value::Null),
                })
                .to_string()
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Value::String(digest))
    }
}

/// `transform.pick`: descend into a value with the dotted path from
/// params; absent paths resolve to `null`.
pub struct Pick;

#[async_trait]
impl Capability for Pick {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let value = inputs.require("value")?;
        let path = params.get("path").and_then(Value::as_str).unwrap_or("");
        if path.is_empty() {
            return Ok(value.clone());
        }
        let segs: Vec<String> = path.split('.').map(str::to_string).collect();
        Ok(value_at_path(value, &segs).cloned().unwrap_or(Value::Null))
    }
}

/// `transform.append_context`: push a system message carrying retrieval
/// context onto the conversation.
pub struct AppendContext;

#[async_trait]
impl Capability for AppendContext {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let mut messages = inputs.require_array("messages")?.clone();
        let context = inputs.require_str("context")?;
        messages.push(serde_json::to_value(Message::system(&context_prompt(
            context,
        )))?);
        Ok(Value::Array(messages))
    }
}

/// `transform.is_non_empty`: boolean gate on collections and strings.
pub struct IsNonEmpty;

#[async_trait]
impl Capability for IsNonEmpty {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let value = inputs.get("value").cloned().unwrap_or(Value::Null);
        let non_empty = match value {
            Value::Array(items) => !items.is_empty(),
            Value::String(s) => !s.trim().is_empty(),
            Value::Object(map) => !map.is_empty(),
            Value::Null => false,
            _ => true,
        };
        Ok(Value::Bool(non_empty))
    }
}

/// `transform.parse_json`: parse a model's text output into structured
/// data; malformed output is a capability error the pipeline can map to a
/// generation failure.
pub struct ParseJson;

#[async_trait]
impl Capability for ParseJson {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let text = inputs.require_str("text")?;
        Ok(serde_json::from_str(text)?)
    }
}

/// `transform.item_links`: link URLs out of feed entries.
pub struct ItemLinks;

#[async_trait]
impl Capability for ItemLinks {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let items = inputs.require_array("items")?;
        let links: Vec<Value> = items
            .iter()
            .filter_map(|item| item.get("link").and_then(Value::as_str))
            .map(|link| Value::String(link.to_string()))
            .collect();
        Ok(Value::Array(links))
    }
}

/// `transform.select_feed`: map a triage verdict onto the curated feed
/// catalog: `{urls, keywords}`.
pub struct SelectFeed {
    catalog: Vec<FeedCategory>,
}

impl SelectFeed {
    pub fn new(catalog: Vec<FeedCategory>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Capability for SelectFeed {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let verdict = inputs.require("verdict")?;
        let field = verdict.get("field").and_then(Value::as_str).unwrap_or("");
        let keywords = verdict.get("keywords").cloned().unwrap_or(json!([]));
        let urls: Vec<String> = self
            .catalog
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.urls.clone())
            .unwrap_or_default();
        Ok(json!({"urls": urls, "keywords": keywords}))
    }
}

/// `transform.resolve_voice`: explicit speaker→voice map entry, else the
/// first configured voice.
pub struct ResolveVoice;

#[async_trait]
impl Capability for ResolveVoice {
    async fn invoke(&self, inputs: NamedInputs, _params: &Value) -> Result<Value, CapabilityError> {
        let speaker = inputs.require_str("speaker")?;
        let fallback = inputs.require_str("fallback")?;
        let voice = inputs
            .get("voicemap")
            .and_then(|m| m.get(speaker))
            .and_then(Value::as_str)
            .unwrap_or(fallback);
        Ok(Value::String(voice.to_string()))
    }
}

/// `transform.line_path`: join a scratch directory and a per-line
/// filename into a clip path.
pub struct LinePath;

#[async_trait]
impl Capability for LinePath {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let dir = inputs.require_str("dir")?;
        let filename = inputs.require_str("filename")?;
        let ext = params.get("ext").and_then(Value::as_str).unwrap_or("mp3");
        let path = std::path::Path::new(dir).join(format!("{filename}.{ext}"));
        Ok(Value::String(path.to_string_lossy().into_owned()))
    }
}

/// `transform.pluck`: project one path out of every element of a
/// sequence. Strict: an element missing the path (for example a map
/// fan-out slot carrying `onError`) fails the node.
pub struct Pluck;

#[async_trait]
impl Capability for Pluck {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let items = inputs.require_array("items")?;
        let path = params.get("path").and_then(Value::as_str).unwrap_or("");
        let segs: Vec<String> = path.split('.').map(str::to_string).collect();
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if let Some(detail) = item.get("onError") {
                return Err(CapabilityError::Extraction {
                    message: format!(
                        "element {index} failed upstream: {}",
                        detail.get("message").and_then(Value::as_str).unwrap_or("unknown")
                    ),
                });
            }
            match value_at_path(item, &segs) {
                Some(v) => out.push(v.clone()),
                None => {
                    return Err(CapabilityError::Extraction {
                        message: format!("element {index} has no value at path {path}"),
                    });
                }
            }
        }
        Ok(Value::Array(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(pairs: &[(&str, Value)]) -> NamedInputs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn collect_urls_handles_both_shapes() {
        let wrapped = inputs(&[(
            "results",
            json!({"results": [{"url": "https://a", "title": "A"}]}),
        )]);
        let out = CollectUrls.invoke(wrapped, &Value::Null).await.unwrap();
        assert_eq!(out, json!([{"url": "https://a", "title": "A"}]));

        let flat = inputs(&[("results", json!([{"link": "https://b"}]))]);
        let out = CollectUrls.invoke(flat, &Value::Null).await.unwrap();
        assert_eq!(out, json!([{"url": "https://b", "title": ""}]));
    }

    #[tokio::test]
    async fn digest_uses_configured_field() {
        let ins = inputs(&[(
            "results",
            json!([{"title": "T", "body_text": "hello"}]),
        )]);
        let out = DigestResults
            .invoke(ins, &json!({"field": "body_text"}))
            .await
            .unwrap();
        let text = out.as_str().unwrap();
        assert!(text.contains("\"content\":\"hello\""));
    }

    #[tokio::test]
    async fn pick_descends_and_defaults_to_null() {
        let ins = inputs(&[("value", json!({"a": {"b": 7}}))]);
        let out = Pick.invoke(ins.clone(), &json!({"path": "a.b"})).await.unwrap();
        assert_eq!(out, json!(7));
        let out = Pick.invoke(ins, &json!({"path": "a.z"})).await.unwrap();
        assert_eq!(out, Value::Null);
    }

    #[tokio::test]
    async fn append_context_pushes_system_message() {
        let ins = inputs(&[
            ("messages", json!([{"role": "user", "content": "hi"}])),
            ("context", json!("facts")),
        ]);
        let out = AppendContext.invoke(ins, &Value::Null).await.unwrap();
        let messages = out.as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1]["role"], "system");
        assert!(messages[1]["content"].as_str().unwrap().contains("facts"));
    }

    #[tokio::test]
    async fn is_non_empty_gate() {
        for (value, expected) in [
            (json!([]), false),
            (json!([1]), true),
            (json!("  "), false),
            (json!("x"), true),
            (Value::Null, false),
        ] {
            let ins = inputs(&[("value", value)]);
            let out = IsNonEmpty.invoke(ins, &Value::Null).await.unwrap();
            assert_eq!(out, json!(expected));
        }
    }

    #[tokio::test]
    async fn select_feed_matches_catalog_field() {
        let cap = SelectFeed::new(crate::config::default_feeds());
        let ins = inputs(&[(
            "verdict",
            json!({"rss_need": true, "field": "economy", "keywords": ["yen"]}),
        )]);
        let out = cap.invoke(ins, &Value::Null).await.unwrap();
        assert!(out["urls"][0].as_str().unwrap().contains("cat4"));
        assert_eq!(out["keywords"], json!(["yen"]));
    }

    #[tokio::test]
    async fn resolve_voice_prefers_map_entry() {
        let ins = inputs(&[
            ("speaker", json!("Host")),
            ("voicemap", json!({"Host": "echo"})),
            ("fallback", json!("shimmer")),
        ]);
        let out = ResolveVoice.invoke(ins, &Value::Null).await.unwrap();
        assert_eq!(out, json!("echo"));

        let ins = inputs(&[
            ("speaker", json!("Guest")),
            ("voicemap", json!({"Host": "echo"})),
            ("fallback", json!("shimmer")),
        ]);
        let out = ResolveVoice.invoke(ins, &Value::Null).await.unwrap();
        assert_eq!(out, json!("shimmer"));
    }

    #[tokio::test]
    async fn pluck_is_strict_about_failed_elements() {
        let ok = inputs(&[("items", json!([{"clip": {"path": "/a"}}]))]);
        let out = Pluck
            .invoke(ok, &json!({"path": "clip.path"}))
            .await
            .unwrap();
        assert_eq!(out, json!(["/a"]));

        let failed = inputs(&[(
            "items",
            json!([{"clip": {"path": "/a"}}, {"onError": {"message": "tts down"}}]),
        )]);
        let err = Pluck
            .invoke(failed, &json!({"path": "clip.path"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("element 1"));
    }
}
