//! Network capability tests against a local mock HTTP server.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use httpmock::prelude::*;
use serde_json::{Value, json};

use podweave::capabilities::article::ArticleExtract;
use podweave::capabilities::llm::LlmComplete;
use podweave::capabilities::rss::RssFetch;
use podweave::capabilities::search::{WebExtract, WebSearch};
use podweave::capabilities::tts::TtsSynthesize;
use podweave::config::{LlmConfig, SearchConfig, TtsConfig};
use podweave::registry::{Capability, CapabilityError, NamedInputs};

fn inputs(pairs: &[(&str, Value)]) -> NamedInputs {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn llm_config(base_url: String) -> LlmConfig {
    LlmConfig {
        api_key: "test-key".into(),
        base_url,
        ..LlmConfig::default()
    }
}

#[tokio::test]
async fn llm_complete_returns_text() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            }));
        })
        .await;

    let cap = LlmComplete::new(reqwest::Client::new(), llm_config(server.base_url()));
    let out = cap
        .invoke(
            inputs(&[("messages", json!([{"role": "user", "content": "hi"}]))]),
            &Value::Null,
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(out, json!({"text": "hello"}));
}

#[tokio::test]
async fn llm_complete_surfaces_tool_calls() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_1", "function": {"name": "lookup"}}],
                }}],
            }));
        })
        .await;

    let cap = LlmComplete::new(reqwest::Client::new(), llm_config(server.base_url()));
    let out = cap
        .invoke(
            inputs(&[("prompt", json!("use the tool"))]),
            &json!({"tools": [{"type": "function", "function": {"name": "lookup"}}]}),
        )
        .await
        .unwrap();
    assert_eq!(out["tool_calls"][0]["id"], "call_1");
}

#[tokio::test]
async fn llm_complete_maps_error_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(429).body("slow down");
        })
        .await;

    let cap = LlmComplete::new(reqwest::Client::new(), llm_config(server.base_url()));
    let err = cap
        .invoke(inputs(&[("prompt", json!("hi"))]), &Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Provider { provider: "llm", .. }));
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn llm_complete_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200)
                .delay(std::time::Duration::from_millis(800))
                .json_body(json!({"choices": [{"message": {"content": "late"}}]}));
        })
        .await;

    let cap = LlmComplete::new(reqwest::Client::new(), llm_config(server.base_url()));
    let err = cap
        .invoke(
            inputs(&[("prompt", json!("hi"))]),
            &json!({"timeout_ms": 50}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Timeout { .. }));
}

#[tokio::test]
async fn web_search_normalizes_payload() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({
                "results": [{"url": "https://r1", "title": "R1"}],
                "answer": "short answer",
                "response_time": 0.3,
            }));
        })
        .await;

    let config = SearchConfig {
        api_key: "k".into(),
        base_url: server.base_url(),
        max_results: 5,
    };
    let cap = WebSearch::new(reqwest::Client::new(), config);
    let out = cap
        .invoke(inputs(&[("query", json!("rust"))]), &Value::Null)
        .await
        .unwrap();
    assert_eq!(out["results"][0]["url"], "https://r1");
    assert_eq!(out["answer"], "short answer");
    assert!(out.get("response_time").is_none());
}

#[tokio::test]
async fn web_extract_enforces_url_budget() {
    let config = SearchConfig::default();
    let cap = WebExtract::new(reqwest::Client::new(), config);

    let too_many: Vec<Value> = (0..21).map(|i| json!(format!("https://x/{i}"))).collect();
    let err = cap
        .invoke(inputs(&[("urls", Value::Array(too_many))]), &Value::Null)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("20"));

    let err = cap
        .invoke(inputs(&[("urls", json!([]))]), &Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::MissingInput { .. }));
}

#[tokio::test]
async fn rss_fetch_filters_by_keyword() {
    let feed = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>News</title>
<item><title>量子コンピュータ進展</title><link>https://news/1</link><description>quantum progress</description></item>
<item><title>天気予報</title><link>https://news/2</link><description>weather</description></item>
</channel></rss>"#;

    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/feed.xml");
            then.status(200).body(feed);
        })
        .await;

    let cap = RssFetch::new(reqwest::Client::new());
    let out = cap
        .invoke(
            inputs(&[
                ("feed_urls", json!([format!("{}/feed.xml", server.base_url())])),
                ("keywords", json!(["量子"])),
            ]),
            &Value::Null,
        )
        .await
        .unwrap();

    let items = out.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["link"], "https://news/1");
}

#[tokio::test]
async fn rss_fetch_skips_broken_feeds_but_fails_when_all_break() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/bad.xml");
            then.status(500);
        })
        .await;

    let cap = RssFetch::new(reqwest::Client::new());
    let err = cap
        .invoke(
            inputs(&[(
                "feed_urls",
                json!([format!("{}/bad.xml", server.base_url())]),
            )]),
            &Value::Null,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Extraction { .. }));
}

#[tokio::test]
async fn article_extract_tolerates_dead_links() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/story");
            then.status(200).body(
                "<html><body><h1>Story</h1><article>\
                 <p>A long enough paragraph describing the event in detail for extraction.</p>\
                 <p>And a second paragraph to pad the body further.</p>\
                 </article></body></html>",
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        })
        .await;

    let cap = ArticleExtract::new(reqwest::Client::new());
    let out = cap
        .invoke(
            inputs(&[(
                "urls",
                json!([
                    format!("{}/story", server.base_url()),
                    format!("{}/gone", server.base_url()),
                ]),
            )]),
            &Value::Null,
        )
        .await
        .unwrap();

    let results = out.as_array().unwrap();
    assert_eq!(results[0]["source"], "extracted");
    assert_eq!(results[0]["title"], "Story");
    assert_eq!(results[1]["source"], "none");
    assert_eq!(results[1]["body_text"], "");
}

#[tokio::test]
async fn tts_synthesize_round_trips_bytes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/audio/speech");
            then.status(200).body("binary-audio");
        })
        .await;

    let config = TtsConfig {
        api_key: "k".into(),
        base_url: server.base_url(),
        ..TtsConfig::default()
    };
    let cap = TtsSynthesize::new(reqwest::Client::new(), config);
    let out = cap
        .invoke(
            inputs(&[("text", json!("hello")), ("voice", json!("echo"))]),
            &Value::Null,
        )
        .await
        .unwrap();

    let decoded = BASE64.decode(out["buffer"].as_str().unwrap()).unwrap();
    assert_eq!(decoded, b"binary-audio");
}

#[tokio::test]
async fn tts_synthesize_empty_body_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/audio/speech");
            then.status(200).body("");
        })
        .await;

    let config = TtsConfig {
        api_key: "k".into(),
        base_url: server.base_url(),
        ..TtsConfig::default()
    };
    let cap = TtsSynthesize::new(reqwest::Client::new(), config);
    let err = cap
        .invoke(inputs(&[("text", json!("hello"))]), &Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, CapabilityError::Tts { .. }));
}
