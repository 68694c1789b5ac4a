//! Curated feed retrieval with keyword filtering.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::registry::{Capability, CapabilityError, NamedInputs, timeout_from_params, with_timeout};

const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_MAX_ITEMS: usize = 5;

/// `rss.fetch`: fetch feeds, filter entries by keywords, cap the count.
///
/// Inputs: `feed_urls`, optional `keywords`. Params: `max_items` (per
/// feed), `timeout_ms`. A feed that fails to fetch or parse is logged and
/// skipped; the capability only fails when no feed could be read at all.
///
/// Output: `[{title, link, pub_date}]`.
pub struct RssFetch {
    client: reqwest::Client,
}

impl RssFetch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_all(
        &self,
        feed_urls: Vec<String>,
        keywords: Vec<String>,
        max_items: usize,
    ) -> Result<Value, CapabilityError> {
        let mut items = Vec::new();
        let mut fetched_any = false;
        for url in &feed_urls {
            match self.fetch_one(url, &keywords, max_items).await {
                Ok(mut feed_items) => {
                    fetched_any = true;
                    items.append(&mut feed_items);
                }
                Err(e) => warn!(url, error = %e, "feed fetch failed, skipping"),
            }
        }
        if !fetched_any {
            return Err(CapabilityError::Extraction {
                message: format!("no feed could be read out of {}", feed_urls.len()),
            });
        }
        Ok(Value::Array(items))
    }

    async fn fetch_one(
        &self,
        url: &str,
        keywords: &[String],
        max_items: usize,
    ) -> Result<Vec<Value>, CapabilityError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(CapabilityError::Http)?
            .bytes()
            .await?;
        let feed = feed_rs::parser::parse(bytes.as_ref()).map_err(|e| {
            CapabilityError::Extraction {
                message: format!("feed parse failed: {e}"),
            }
        })?;

        let items = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                let link = entry.links.first().map(|l| l.href.clone())?;
                let summary = entry.summary.map(|s| s.content).unwrap_or_default();
                if !keywords.is_empty() {
                    let haystack = format!("{title} {summary}");
                    if !keywords.iter().any(|kw| haystack.contains(kw.as_str())) {
                        return None;
                    }
                }
                Some(json!({
                    "title": title,
                    "link": link,
                    "pub_date": entry.published.map(|d| d.to_rfc3339()),
                }))
            })
            .take(max_items)
            .collect();
        Ok(items)
    }
}

#[async_trait]
impl Capability for RssFetch {
    async fn invoke(&self, inputs: NamedInputs, params: &Value) -> Result<Value, CapabilityError> {
        let feed_urls = inputs.str_items("feed_urls")?;
        let keywords = inputs
            .get("keywords")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let max_items = params
            .get("max_items")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_ITEMS);

        debug!(feeds = feed_urls.len(), ?keywords, "fetching feeds");
        let ms = timeout_from_params(params, DEFAULT_TIMEOUT_MS);
        with_timeout("rss.fetch", ms, self.fetch_all(feed_urls, keywords, max_items)).await
    }
}
