//! The two composed workflows: script generation and audio assembly.
//!
//! Pipelines are pure consumers of the [`executor`](crate::executor):
//! they validate domain input, build a [`GraphSpec`](crate::graph::GraphSpec),
//! inject request values, run the graph, and shape the result bag into a
//! typed response. They carry no HTTP concerns; the transport layer maps
//! [`PipelineError`] kinds onto status codes.

use miette::Diagnostic;
use thiserror::Error;

use crate::executor::ExecutorError;
use crate::graph::GraphDefinitionError;

pub mod audio;
pub mod entities;
pub mod prompts;
pub mod script;

pub use audio::AudioPipeline;
pub use script::ScriptPipeline;

/// Pipeline-level failures, with enough structure for a lossless mapping
/// to transport status codes (validation → 400, the rest → 500).
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid {field}: {message}")]
    #[diagnostic(code(podweave::pipeline::validation))]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("script generation failed: {message}")]
    #[diagnostic(code(podweave::pipeline::generation_failed))]
    GenerationFailed { message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Definition(#[from] GraphDefinitionError),

    #[error(transparent)]
    #[diagnostic(code(podweave::pipeline::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(podweave::pipeline::json))]
    Json(#[from] serde_json::Error),
}
