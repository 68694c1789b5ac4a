//! Graph definition for podweave workflows.
//!
//! A [`GraphSpec`] is pure, serializable data describing named computation
//! steps and the data dependencies between them: value placeholders filled
//! by external injection, capability invocations with input bindings and
//! activation gates, embedded sub-graphs with explicit parent-input
//! forwarding, and map fan-outs that run a sub-graph once per element of a
//! collection. The spec performs no computation itself; the
//! [`executor`](crate::executor) interprets it.
//!
//! Construction-time validation is strict: every reference must resolve to
//! a declared node, sub-graph inputs must target declared `parent_*` value
//! nodes, map sub-graphs must declare a `row` value node, and the reference
//! graph must be acyclic. Violations are [`GraphDefinitionError`]s raised
//! before any execution starts.
//!
//! # Quick Start
//!
//! ```
//! use podweave::graph::{Binding, ComputeSpec, GraphBuilder};
//!
//! let spec = GraphBuilder::new()
//!     .value("topic")
//!     .compute(
//!         "summarize",
//!         ComputeSpec::new("llm.complete")
//!             .input("prompt", Binding::reference("topic"))
//!             .result(),
//!     )
//!     .build()
//!     .unwrap();
//! assert!(spec.node("summarize").is_some());
//! ```

mod builder;
mod spec;

pub use builder::GraphBuilder;
pub use spec::{
    Activation, Binding, ComputeSpec, GraphDefinitionError, GraphSpec, MapSpec, NodeId, NodeSpec,
    RefExpr, SubgraphSpec,
};

/// Reserved name for the per-element value node inside a map sub-graph.
pub const ROW_NODE: &str = "row";

/// Prefix required on sub-graph value nodes populated from the outer run.
pub const PARENT_PREFIX: &str = "parent_";
