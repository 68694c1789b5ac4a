//! # Podweave: Graph-driven Podcast Generation Backend
//!
//! Podweave turns a user prompt into a multi-speaker podcast script and
//! then into a mixed, segmented audio stream. The engineering core is a
//! declarative, dependency-based task graph: nodes bind their inputs to
//! other nodes' outputs, activation gates switch whole branches on and
//! off, sub-graphs nest as independent runs, and map fan-outs run a
//! sub-graph per collection element under a concurrency cap.
//!
//! ## Core Concepts
//!
//! - **Graph**: a static, serializable description of named steps and
//!   their data dependencies ([`graph`])
//! - **Capability**: an external-facing operation (LLM call, search, TTS,
//!   media processing) invoked by a node ([`registry`], [`capabilities`])
//! - **Executor**: dependency-ordered concurrent execution with skip and
//!   failure propagation ([`executor`])
//! - **Pipelines**: the script-generation and audio-assembly workflows
//!   composed from graphs ([`pipelines`])
//!
//! ## Quick Start
//!
//! ```
//! use podweave::graph::{Binding, ComputeSpec, GraphBuilder};
//!
//! let spec = GraphBuilder::new()
//!     .value("topic")
//!     .compute(
//!         "gate",
//!         ComputeSpec::new("transform.is_non_empty")
//!             .input("value", Binding::reference("topic")),
//!     )
//!     .compute(
//!         "summarize",
//!         ComputeSpec::new("llm.complete")
//!             .input("prompt", Binding::reference("topic"))
//!             .when("gate")
//!             .result(),
//!     )
//!     .build()
//!     .expect("valid graph");
//! assert_eq!(spec.nodes.len(), 3);
//! ```
//!
//! Running a spec takes an [`executor::Executor`] plus a
//! [`registry::CapabilityRegistry`]; the production capability set is
//! assembled by [`capabilities::builtin_registry`]. The two request-level
//! entry points are [`pipelines::ScriptPipeline`] and
//! [`pipelines::AudioPipeline`].
//!
//! ## Module Guide
//!
//! - [`graph`] - graph specs, bindings, activation gates, validation
//! - [`executor`] - the scheduler: waves, propagation, fan-out, results
//! - [`registry`] - the capability trait and name registry
//! - [`capabilities`] - built-in LLM/search/RSS/TTS/media/storage set
//! - [`pipelines`] - script generation and audio assembly
//! - [`config`] - explicit configuration threaded at startup
//! - [`scratch`] - job-scoped scratch directories with guaranteed cleanup
//! - [`message`] - chat message type
//! - [`errors`] - structured per-node failure records
//! - [`telemetry`] - tracing subscriber setup

pub mod capabilities;
pub mod config;
pub mod errors;
pub mod executor;
pub mod graph;
pub mod message;
pub mod pipelines;
pub mod registry;
pub mod scratch;
pub mod telemetry;
pub mod utils;
