//! Readable-article extraction from news pages.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::registry::{Capability, CapabilityError, NamedInputs, timeout_from_params, with_timeout};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MIN_LENGTH: usize = 60;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; PodweaveArticleExtractor/1.0)";

/// `article.extract`: fetch pages and harvest their readable body text.
///
/// Inputs: `urls`. Params: `min_length`, `timeout_ms`.
///
/// A page whose body cannot be extracted (fetch failure, or text shorter
/// than `min_length`) contributes `{url, source: "none", body_text: ""}`
/// instead of failing the node, so one dead link does not sink the branch.
///
/// Output: `[{url, source, title?, body_text}]`.
pub struct ArticleExtract {
    client: reqwest::Client,
}

impl ArticleExtract {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn extract_all(
        &self,
        urls: Vec<String>,
        min_length: usize,
    ) -> Result<Value, CapabilityError> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetch(&url).await {
                Ok(html) => results.push(extract_article(&html, &url, min_length)),
                Err(e) => {
                    warn!(url, error = %e, "article fetch failed");
                    results.push(json!({"url": url, "source": "none", "body_text": ""}));
                }
            }
        }
        Ok(Value::Array(results))
    }

    async fn fetch(&self, url: &str) -> Result<String, CapabilityError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept-Language", "ja,en;q=0.8")
            .send()
            .await?
            .error_for_status()
            .map_err(CapabilityError::Http)?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Capability for ArticleExtract {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let urls = inputs.str_items("urls")?;
        let min_length = params
            .get("min_length")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MIN_LENGTH);
        debug!(count = urls.len(), "extracting articles");
        let ms = timeout_from_params(params, DEFAULT_TIMEOUT_MS);
        with_timeout("article.extract", ms, self.extract_all(urls, min_length)).await
    }
}

/// Harvest the readable body from one page: paragraphs under the most
/// article-like container, falling back to all paragraphs. The parsed DOM
/// never crosses an await point.
fn extract_article(html: &str, url: &str, min_length: usize) -> Value {
    let document = Html::parse_document(html);

    let containers = ["article p", "main p", "p"];
    let mut body_text = String::new();
    for selector_text in containers {
        let selector = Selector::parse(selector_text).expect("static selector");
        let paragraphs: Vec<String> = document
            .select(&selector)
            .map(|p| normalize(&p.text().collect::<String>()))
            .filter(|text| !text.is_empty())
            .collect();
        let candidate = paragraphs.join("\n");
        if candidate.chars().count() >= min_length {
            body_text = candidate;
            break;
        }
    }

    if body_text.chars().count() < min_length {
        return json!({"url": url, "source": "none", "body_text": ""});
    }

    let title = select_first_text(&document, "h1")
        .or_else(|| select_meta_content(&document, "meta[property=\"og:title\"]"));

    json!({
        "url": url,
        "source": "extracted",
        "title": title,
        "body_text": body_text,
    })
}

fn select_first_text(document: &Html, selector_text: &str) -> Option<String> {
    let selector = Selector::parse(selector_text).ok()?;
    document
        .select(&selector)
        .map(|el| normalize(&el.text().collect::<String>()))
        .find(|text| !text.is_empty())
}

fn select_meta_content(document: &Html, selector_text: &str) -> Option<String> {
    let selector = Selector::parse(selector_text).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
