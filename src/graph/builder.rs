//! Fluent construction of [`GraphSpec`] values.

use serde_json::Value;

use super::spec::{
    ComputeSpec, GraphDefinitionError, GraphSpec, MapSpec, NodeSpec, SubgraphSpec,
};

/// Builder for workflow graphs.
///
/// Nodes are declared in order; [`build`](Self::build) validates the whole
/// definition (references, parent inputs, row nodes, acyclicity) and fails
/// fast with a [`GraphDefinitionError`] before anything can execute.
///
/// # Examples
///
/// ```
/// use podweave::graph::{Binding, ComputeSpec, GraphBuilder};
///
/// let spec = GraphBuilder::new()
///     .value("query")
///     .compute(
///         "search",
///         ComputeSpec::new("web.search")
///             .input("query", Binding::reference("query"))
///             .result(),
///     )
///     .build()
///     .unwrap();
/// assert_eq!(spec.nodes.len(), 2);
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<(String, NodeSpec)>,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Declare a value placeholder to be filled by external injection.
    #[must_use]
    pub fn value(mut self, id: impl Into<String>) -> Self {
        self.nodes
            .push((id.into(), NodeSpec::Value { default: None }));
        self
    }

    /// Declare a value node pre-bound to a literal.
    #[must_use]
    pub fn value_with_default(mut self, id: impl Into<String>, default: Value) -> Self {
        self.nodes.push((
            id.into(),
            NodeSpec::Value {
                default: Some(default),
            },
        ));
        self
    }

    /// Declare a capability invocation node.
    #[must_use]
    pub fn compute(mut self, id: impl Into<String>, spec: ComputeSpec) -> Self {
        self.nodes.push((id.into(), NodeSpec::Compute(spec)));
        self
    }

    /// Declare an embedded sub-graph node.
    #[must_use]
    pub fn subgraph(mut self, id: impl Into<String>, spec: SubgraphSpec) -> Self {
        self.nodes.push((id.into(), NodeSpec::Subgraph(spec)));
        self
    }

    /// Declare a map fan-out node.
    #[must_use]
    pub fn map(mut self, id: impl Into<String>, spec: MapSpec) -> Self {
        self.nodes.push((id.into(), NodeSpec::Map(spec)));
        self
    }

    /// Validate and produce the immutable spec.
    pub fn build(self) -> Result<GraphSpec, GraphDefinitionError> {
        let spec = GraphSpec { nodes: self.nodes };
        spec.validate()?;
        Ok(spec)
    }
}
