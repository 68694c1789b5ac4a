//! Script generation: four mutually exclusive content-sourcing branches
//! feeding one schema-constrained composition call.
//!
//! Branch selection happens inside the graph, driven by two injected
//! signals:
//!
//! - **A (direct)**: no references, no search: compose from the
//!   conversation history alone.
//! - **B (extract)**: explicit references: extract their full text and
//!   compose from it.
//! - **C (feed)**: search requested and triage prefers a curated feed:
//!   pick a topical feed, filter by keywords, extract article bodies.
//! - **D (search)**: search requested and triage prefers ad-hoc search:
//!   formulate a query, search, compose from the synthesized answer.
//!
//! Exactly one branch populates its result nodes per run. The merge is an
//! explicit first-populated rule in priority order A, B, C, D, and is part of
//! this pipeline's contract, not an artifact of iteration order.

use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

use crate::capabilities::llm::{
    query_response_format, script_response_format, triage_response_format,
};
use crate::config::PodweaveConfig;
use crate::executor::{Executor, ResultBag};
use crate::graph::{
    Binding, ComputeSpec, GraphBuilder, GraphDefinitionError, GraphSpec, SubgraphSpec,
};
use crate::message::Message;
use crate::pipelines::PipelineError;
use crate::pipelines::entities::{
    CreateScriptInput, CreateScriptOutput, PromptScriptData, Reference, ScriptLine, Situation,
};
use crate::pipelines::prompts;
use crate::registry::CapabilityRegistry;

#[derive(Deserialize)]
struct ScriptPayload {
    scripts: Vec<ScriptLine>,
}

/// Turns a prompt (plus optional references and search intent) into a
/// multi-speaker script with source references.
pub struct ScriptPipeline {
    config: PodweaveConfig,
    registry: Arc<CapabilityRegistry>,
}

impl ScriptPipeline {
    pub fn new(config: PodweaveConfig, registry: Arc<CapabilityRegistry>) -> Self {
        Self { config, registry }
    }

    #[instrument(skip_all, fields(is_search = input.is_search, references = input.reference.len()))]
    pub async fn create_script(
        &self,
        input: CreateScriptInput,
    ) -> Result<CreateScriptOutput, PipelineError> {
        let situation = validate(&input)?;

        let mut messages = vec![Message::system(prompts::system_prompt(situation))];
        for prior in &input.previous_script {
            messages.push(Message::user(&prior.prompt));
            messages.push(Message::assistant(&serde_json::to_string(&prior.script)?));
        }

        let has_references = !input.reference.is_empty();
        let is_search = has_references || input.is_search;
        let reference_urls: Vec<String> =
            input.reference.iter().map(|r| r.url.clone()).collect();
        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

        let graph = build_script_graph(&self.config)?;
        let mut executor = Executor::new(graph, self.registry.clone())?;
        executor.inject("prompt", json!(input.prompt))?;
        executor.inject("is_search", json!(is_search))?;
        executor.inject("messages", serde_json::to_value(&messages)?)?;
        executor.inject("reference", json!(reference_urls))?;
        executor.inject(
            "query_messages",
            serde_json::to_value(vec![Message::system(&prompts::search_query_prompt(
                &today,
                &input.prompt,
            ))])?,
        )?;

        let bag = executor.run().await?;

        let (text, discovered) =
            merge_branches(&bag).ok_or_else(|| PipelineError::GenerationFailed {
                message: "no content branch produced a script".into(),
            })?;
        let payload: ScriptPayload =
            serde_json::from_str(&text).map_err(|e| PipelineError::GenerationFailed {
                message: format!("model output was not a valid script: {e}"),
            })?;
        if payload.scripts.is_empty() {
            return Err(PipelineError::GenerationFailed {
                message: "model produced an empty script".into(),
            });
        }

        // Discovered sources win; explicit references only fill the gap
        // when no branch surfaced any.
        let reference = if discovered.is_empty() {
            input.reference.clone()
        } else {
            discovered
        };

        Ok(CreateScriptOutput {
            new_script: PromptScriptData {
                prompt: input.prompt,
                script: payload.scripts,
                reference,
                situation,
            },
            previous_script: input.previous_script,
        })
    }
}

fn validate(input: &CreateScriptInput) -> Result<Option<Situation>, PipelineError> {
    if input.prompt.trim().is_empty() {
        return Err(PipelineError::Validation {
            field: "prompt",
            message: "prompt must be non-empty".into(),
        });
    }
    match &input.situation {
        None => Ok(None),
        Some(raw) => Situation::parse(raw)
            .map(Some)
            .ok_or_else(|| PipelineError::Validation {
                field: "situation",
                message: format!("unknown situation: {raw}"),
            }),
    }
}

/// First populated branch in priority order A, B, C, D.
fn merge_branches(bag: &ResultBag) -> Option<(String, Vec<Reference>)> {
    if let Some(direct) = bag.get("direct") {
        let text = direct.get("text")?.as_str()?.to_string();
        return Some((text, Vec::new()));
    }
    for branch in ["extract_branch", "feed_branch", "search_branch"] {
        if let Some(result) = bag.get(branch) {
            let text = result
                .get("compose")
                .and_then(|c| c.get("text"))
                .and_then(Value::as_str)?
                .to_string();
            let sources = result
                .get("sources")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            Some(Reference {
                                url: item.get("url")?.as_str()?.to_string(),
                                title: item
                                    .get("title")
                                    .and_then(Value::as_str)
                                    .filter(|t| !t.is_empty())
                                    .map(str::to_string),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Some((text, sources));
        }
    }
    None
}

/// The top-level script graph. Value nodes are injected per request; the
/// branch gates mirror the selection table above.
pub fn build_script_graph(config: &PodweaveConfig) -> Result<GraphSpec, GraphDefinitionError> {
    GraphBuilder::new()
        .value("is_search")
        .value("prompt")
        .value("messages")
        .value("reference")
        .value("query_messages")
        .compute(
            "direct",
            ComputeSpec::new("llm.complete")
                .input("messages", Binding::reference("messages"))
                .input("prompt", Binding::reference("prompt"))
                .params(json!({"response_format": script_response_format()}))
                .unless("is_search")
                .result(),
        )
        .compute(
            "reference_check",
            ComputeSpec::new("transform.is_non_empty")
                .input("value", Binding::reference("reference"))
                .when("is_search"),
        )
        .subgraph(
            "extract_branch",
            SubgraphSpec::new(extract_graph()?)
                .input("parent_messages", Binding::reference("messages"))
                .input("parent_prompt", Binding::reference("prompt"))
                .input("parent_reference", Binding::reference("reference"))
                .when("reference_check")
                .result(),
        )
        .subgraph(
            "triage",
            SubgraphSpec::new(triage_graph(config)?)
                .input("parent_prompt", Binding::reference("prompt"))
                .unless("reference_check"),
        )
        .subgraph(
            "search_branch",
            SubgraphSpec::new(search_graph(config)?)
                .input("parent_messages", Binding::reference("messages"))
                .input("parent_prompt", Binding::reference("prompt"))
                .input("parent_query_messages", Binding::reference("query_messages"))
                .unless("triage.use_feed")
                .result(),
        )
        .subgraph(
            "feed_branch",
            SubgraphSpec::new(feed_graph()?)
                .input("parent_messages", Binding::reference("messages"))
                .input("parent_prompt", Binding::reference("prompt"))
                .input("parent_triage", Binding::reference("triage.verdict"))
                .when("triage.use_feed")
                .result(),
        )
        .build()
}

/// Branch B: fetch the given references and compose from their text.
fn extract_graph() -> Result<GraphSpec, GraphDefinitionError> {
    GraphBuilder::new()
        .value("parent_messages")
        .value("parent_prompt")
        .value("parent_reference")
        .compute(
            "extract",
            ComputeSpec::new("web.extract")
                .input("urls", Binding::reference("parent_reference"))
                .timeout_ms(10_000),
        )
        .compute(
            "sources",
            ComputeSpec::new("transform.collect_urls")
                .input("results", Binding::reference("extract"))
                .result(),
        )
        .compute(
            "context",
            ComputeSpec::new("transform.digest")
                .input("results", Binding::reference("extract"))
                .params(json!({"field": "raw_content"})),
        )
        .compute(
            "with_context",
            ComputeSpec::new("transform.append_context")
                .input("messages", Binding::reference("parent_messages"))
                .input("context", Binding::reference("context")),
        )
        .compute(
            "compose",
            ComputeSpec::new("llm.complete")
                .input("messages", Binding::reference("with_context"))
                .input("prompt", Binding::reference("parent_prompt"))
                .params(json!({"response_format": script_response_format()}))
                .result(),
        )
        .build()
}

/// Decides between branch C and D for search-style requests.
fn triage_graph(config: &PodweaveConfig) -> Result<GraphSpec, GraphDefinitionError> {
    GraphBuilder::new()
        .value("parent_prompt")
        .compute(
            "judge",
            ComputeSpec::new("llm.complete")
                .input(
                    "messages",
                    Binding::literal(json!([{
                        "role": "system",
                        "content": prompts::TRIAGE_PROMPT,
                    }])),
                )
                .input("prompt", Binding::reference("parent_prompt"))
                .params(json!({
                    "model": config.llm.triage_model,
                    "response_format": triage_response_format(),
                })),
        )
        .compute(
            "verdict",
            ComputeSpec::new("transform.parse_json")
                .input("text", Binding::reference("judge.text"))
                .result(),
        )
        .compute(
            "use_feed",
            ComputeSpec::new("transform.pick")
                .input("value", Binding::reference("verdict"))
                .params(json!({"path": "rss_need"}))
                .result(),
        )
        .build()
}

/// Branch C: curated feed → keyword filter → article bodies → compose.
/// The feed catalog itself lives in the `transform.select_feed` capability.
fn feed_graph() -> Result<GraphSpec, GraphDefinitionError> {
    GraphBuilder::new()
        .value("parent_messages")
        .value("parent_prompt")
        .value("parent_triage")
        .compute(
            "feed",
            ComputeSpec::new("transform.select_feed")
                .input("verdict", Binding::reference("parent_triage")),
        )
        .compute(
            "items",
            ComputeSpec::new("rss.fetch")
                .input("feed_urls", Binding::reference("feed.urls"))
                .input("keywords", Binding::reference("feed.keywords")),
        )
        .compute(
            "links",
            ComputeSpec::new("transform.item_links").input("items", Binding::reference("items")),
        )
        .compute(
            "articles",
            ComputeSpec::new("article.extract").input("urls", Binding::reference("links")),
        )
        .compute(
            "sources",
            ComputeSpec::new("transform.collect_urls")
                .input("results", Binding::reference("articles"))
                .result(),
        )
        .compute(
            "context",
            ComputeSpec::new("transform.digest")
                .input("results", Binding::reference("articles"))
                .params(json!({"field": "body_text"})),
        )
        .compute(
            "with_context",
            ComputeSpec::new("transform.append_context")
                .input("messages", Binding::reference("parent_messages"))
                .input("context", Binding::reference("context")),
        )
        .compute(
            "compose",
            ComputeSpec::new("llm.complete")
                .input("messages", Binding::reference("with_context"))
                .input("prompt", Binding::reference("parent_prompt"))
                .params(json!({"response_format": script_response_format()}))
                .result(),
        )
        .build()
}

/// Branch D: formulate a query → search → compose from the answer.
fn search_graph(config: &PodweaveConfig) -> Result<GraphSpec, GraphDefinitionError> {
    GraphBuilder::new()
        .value("parent_messages")
        .value("parent_prompt")
        .value("parent_query_messages")
        .compute(
            "formulate",
            ComputeSpec::new("llm.complete")
                .input("messages", Binding::reference("parent_query_messages"))
                .input("prompt", Binding::reference("parent_prompt"))
                .params(json!({
                    "model": config.llm.triage_model,
                    "response_format": query_response_format(),
                })),
        )
        .compute(
            "query_data",
            ComputeSpec::new("transform.parse_json")
                .input("text", Binding::reference("formulate.text")),
        )
        .compute(
            "query",
            ComputeSpec::new("transform.pick")
                .input("value", Binding::reference("query_data"))
                .params(json!({"path": "query"})),
        )
        .compute(
            "results",
            ComputeSpec::new("web.search")
                .input("query", Binding::reference("query"))
                .params(json!({"max_results": config.search.max_results})),
        )
        .compute(
            "sources",
            ComputeSpec::new("transform.collect_urls")
                .input("results", Binding::reference("results"))
                .result(),
        )
        .compute(
            "context",
            ComputeSpec::new("transform.pick")
                .input("value", Binding::reference("results"))
                .params(json!({"path": "answer"})),
        )
        .compute(
            "with_context",
            ComputeSpec::new("transform.append_context")
                .input("messages", Binding::reference("parent_messages"))
                .input("context", Binding::reference("context")),
        )
        .compute(
            "compose",
            ComputeSpec::new("llm.complete")
                .input("messages", Binding::reference("with_context"))
                .input("prompt", Binding::reference("parent_prompt"))
                .params(json!({"response_format": script_response_format()}))
                .result(),
        )
        .build()
}
