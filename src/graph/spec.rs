//! Pure-data node and graph specifications with construction-time checks.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::{PARENT_PREFIX, ROW_NODE};

/// Unique node key, stable within a graph.
pub type NodeId = String;

/// A reference to another node's output, optionally descending into it
/// with a dotted path (`"search.results.0.url"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefExpr {
    pub node: NodeId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl RefExpr {
    /// Parse `"node"` or `"node.seg1.seg2"` into a reference expression.
    ///
    /// Empty node names are caught by graph validation, not here.
    pub fn parse(expr: &str) -> Self {
        let mut parts = expr.split('.');
        let node = parts.next().unwrap_or_default().to_string();
        Self {
            node,
            path: parts.map(str::to_string).collect(),
        }
    }
}

/// How one named input of a node gets its value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// A literal JSON value, available immediately.
    Literal(Value),
    /// Another node's output, resolved once that node is terminal.
    Ref(RefExpr),
}

impl Binding {
    pub fn literal(value: impl Into<Value>) -> Self {
        Binding::Literal(value.into())
    }

    /// Shorthand for a reference binding parsed from `"node[.path]"`.
    pub fn reference(expr: &str) -> Self {
        Binding::Ref(RefExpr::parse(expr))
    }

    pub(crate) fn as_ref_expr(&self) -> Option<&RefExpr> {
        match self {
            Binding::Ref(r) => Some(r),
            Binding::Literal(_) => None,
        }
    }
}

/// Gate controlling whether a node executes or is skipped.
///
/// At most one condition applies per node. A gate referencing a node that
/// was itself skipped propagates the skip; `If`/`Unless` only evaluate
/// against a *completed* output.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Always,
    /// Run only when the referenced output is truthy.
    If(RefExpr),
    /// Run only when the referenced output is falsy or absent.
    Unless(RefExpr),
}

impl Activation {
    pub(crate) fn condition(&self) -> Option<&RefExpr> {
        match self {
            Activation::Always => None,
            Activation::If(r) | Activation::Unless(r) => Some(r),
        }
    }
}

/// A capability invocation with input bindings and execution flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeSpec {
    /// Registry name of the capability to invoke.
    pub capability: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Binding>,
    /// Static parameters handed to the capability unchanged.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "activation_is_always")]
    pub activation: Activation,
    /// Include this node's output in the run's result bag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_result: bool,
    /// Tolerate skipped/failed inputs: run as long as at least one input
    /// resolved to a present value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub any_input: bool,
    /// Convert a capability error into an `{"onError": {...}}` output
    /// instead of failing the node.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub suppress_error: bool,
    /// Hard deadline for the invocation, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn activation_is_always(a: &Activation) -> bool {
    matches!(a, Activation::Always)
}

impl ComputeSpec {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            inputs: BTreeMap::new(),
            params: Value::Null,
            activation: Activation::Always,
            is_result: false,
            any_input: false,
            suppress_error: false,
            timeout_ms: None,
        }
    }

    #[must_use]
    pub fn input(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.inputs.insert(name.into(), binding);
        self
    }

    #[must_use]
    pub fn params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Run only when `condition` resolves truthy.
    #[must_use]
    pub fn when(mut self, condition: &str) -> Self {
        self.activation = Activation::If(RefExpr::parse(condition));
        self
    }

    /// Run only when `condition` resolves falsy or absent.
    #[must_use]
    pub fn unless(mut self, condition: &str) -> Self {
        self.activation = Activation::Unless(RefExpr::parse(condition));
        self
    }

    #[must_use]
    pub fn result(mut self) -> Self {
        self.is_result = true;
        self
    }

    #[must_use]
    pub fn any_input(mut self) -> Self {
        self.any_input = true;
        self
    }

    #[must_use]
    pub fn suppress_error(mut self) -> Self {
        self.suppress_error = true;
        self
    }

    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

/// An embedded sub-graph run as an independent nested execution.
///
/// `inputs` maps child `parent_*` value nodes to bindings resolved in the
/// outer scope before the nested run starts. The child's result bag
/// becomes this node's output object, addressable from the parent as
/// `"subgraphId.innerId[.path]"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubgraphSpec {
    pub graph: GraphSpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Binding>,
    #[serde(default, skip_serializing_if = "activation_is_always")]
    pub activation: Activation,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_result: bool,
}

impl SubgraphSpec {
    pub fn new(graph: GraphSpec) -> Self {
        Self {
            graph,
            inputs: BTreeMap::new(),
            activation: Activation::Always,
            is_result: false,
        }
    }

    #[must_use]
    pub fn input(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.inputs.insert(name.into(), binding);
        self
    }

    #[must_use]
    pub fn when(mut self, condition: &str) -> Self {
        self.activation = Activation::If(RefExpr::parse(condition));
        self
    }

    #[must_use]
    pub fn unless(mut self, condition: &str) -> Self {
        self.activation = Activation::Unless(RefExpr::parse(condition));
        self
    }

    #[must_use]
    pub fn result(mut self) -> Self {
        self.is_result = true;
        self
    }
}

/// A fan-out: one nested run per element of the `over` collection.
///
/// Each element is bound to the child's `row` value node; `inputs` carry
/// constant companions. At most `concurrency` instances run at once, and
/// the aggregated output preserves input order regardless of completion
/// order. A failing element surfaces as an `{"onError": {...}}` entry at
/// its index without cancelling its siblings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapSpec {
    pub graph: GraphSpec,
    pub over: Binding,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "activation_is_always")]
    pub activation: Activation,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_result: bool,
}

impl MapSpec {
    pub fn new(graph: GraphSpec, over: Binding) -> Self {
        Self {
            graph,
            over,
            inputs: BTreeMap::new(),
            concurrency: None,
            activation: Activation::Always,
            is_result: false,
        }
    }

    #[must_use]
    pub fn input(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.inputs.insert(name.into(), binding);
        self
    }

    #[must_use]
    pub fn concurrency(mut self, cap: usize) -> Self {
        self.concurrency = Some(cap);
        self
    }

    #[must_use]
    pub fn when(mut self, condition: &str) -> Self {
        self.activation = Activation::If(RefExpr::parse(condition));
        self
    }

    #[must_use]
    pub fn unless(mut self, condition: &str) -> Self {
        self.activation = Activation::Unless(RefExpr::parse(condition));
        self
    }

    #[must_use]
    pub fn result(mut self) -> Self {
        self.is_result = true;
        self
    }
}

/// One step in a graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpec {
    /// A placeholder holding a literal or externally injected value. If
    /// never injected it resolves to `null` (absent) rather than erroring.
    Value {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    Compute(ComputeSpec),
    Subgraph(SubgraphSpec),
    Map(MapSpec),
}

impl NodeSpec {
    pub(crate) fn activation(&self) -> &Activation {
        const ALWAYS: Activation = Activation::Always;
        match self {
            NodeSpec::Value { .. } => &ALWAYS,
            NodeSpec::Compute(c) => &c.activation,
            NodeSpec::Subgraph(s) => &s.activation,
            NodeSpec::Map(m) => &m.activation,
        }
    }

    pub(crate) fn is_result(&self) -> bool {
        match self {
            NodeSpec::Value { .. } => false,
            NodeSpec::Compute(c) => c.is_result,
            NodeSpec::Subgraph(s) => s.is_result,
            NodeSpec::Map(m) => m.is_result,
        }
    }

    /// Every reference this node resolves before it can run: input
    /// bindings, the fan-out collection, and the activation condition.
    pub(crate) fn references(&self) -> Vec<&RefExpr> {
        let mut refs = Vec::new();
        match self {
            NodeSpec::Value { .. } => {}
            NodeSpec::Compute(c) => {
                refs.extend(c.inputs.values().filter_map(Binding::as_ref_expr));
            }
            NodeSpec::Subgraph(s) => {
                refs.extend(s.inputs.values().filter_map(Binding::as_ref_expr));
            }
            NodeSpec::Map(m) => {
                refs.extend(m.over.as_ref_expr());
                refs.extend(m.inputs.values().filter_map(Binding::as_ref_expr));
            }
        }
        refs.extend(self.activation().condition());
        refs
    }
}

/// A static, serializable description of a workflow graph.
///
/// Node order is the declaration order; lookups are by id. The spec is
/// inert data; see [`crate::executor::Executor`] for running it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    pub nodes: Vec<(NodeId, NodeSpec)>,
}

/// Errors raised while validating a graph definition, always before any
/// execution starts.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphDefinitionError {
    #[error("duplicate node id: {id}")]
    #[diagnostic(code(podweave::graph::duplicate_node))]
    DuplicateNode { id: String },

    #[error("node id must be non-empty and must not contain '.'")]
    #[diagnostic(
        code(podweave::graph::bad_node_id),
        help("Dots are reserved for path references like \"node.field\".")
    )]
    BadNodeId { id: String },

    #[error("node {referrer} references unknown node {target}")]
    #[diagnostic(
        code(podweave::graph::unknown_reference),
        help("Every reference must name a node declared in the same graph.")
    )]
    UnknownReference { referrer: String, target: String },

    #[error("node {referrer} references {subgraph}.{target}, which is not a result of that sub-graph")]
    #[diagnostic(
        code(podweave::graph::unknown_subgraph_result),
        help("Only nodes flagged as results are addressable from the parent scope.")
    )]
    UnknownSubgraphResult {
        referrer: String,
        subgraph: String,
        target: String,
    },

    #[error("sub-graph {subgraph} input {input} must target a declared parent_* value node")]
    #[diagnostic(code(podweave::graph::bad_parent_input))]
    BadParentInput { subgraph: String, input: String },

    #[error("map node {map} sub-graph must declare a 'row' value node")]
    #[diagnostic(code(podweave::graph::missing_row_node))]
    MissingRowNode { map: String },

    #[error("map node {map} input {input} must target a declared value node of the sub-graph")]
    #[diagnostic(code(podweave::graph::bad_map_input))]
    BadMapInput { map: String, input: String },

    #[error("reference cycle through node {through}")]
    #[diagnostic(code(podweave::graph::cycle))]
    Cycle { through: String },
}

impl GraphSpec {
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes
            .iter()
            .find_map(|(nid, spec)| (nid == id).then_some(spec))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(id, _)| id.as_str())
    }

    /// Ids of nodes flagged as results: the keys a run's result bag can
    /// contain.
    pub fn result_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, spec)| spec.is_result())
            .map(|(id, _)| id.as_str())
    }

    /// Validate the whole definition, recursing into sub-graphs.
    pub fn validate(&self) -> Result<(), GraphDefinitionError> {
        let mut seen = FxHashSet::default();
        for (id, _) in &self.nodes {
            if id.is_empty() || id.contains('.') {
                return Err(GraphDefinitionError::BadNodeId { id: id.clone() });
            }
            if !seen.insert(id.as_str()) {
                return Err(GraphDefinitionError::DuplicateNode { id: id.clone() });
            }
        }

        for (id, spec) in &self.nodes {
            for r in spec.references() {
                let Some(target) = self.node(&r.node) else {
                    return Err(GraphDefinitionError::UnknownReference {
                        referrer: id.clone(),
                        target: r.node.clone(),
                    });
                };
                // A dotted path into a sub-graph must land on one of its
                // result nodes; paths into plain outputs are data paths
                // checked at resolution time.
                if let (NodeSpec::Subgraph(sub), Some(first)) = (target, r.path.first()) {
                    if !sub.graph.result_ids().any(|rid| rid == first) {
                        return Err(GraphDefinitionError::UnknownSubgraphResult {
                            referrer: id.clone(),
                            subgraph: r.node.clone(),
                            target: first.clone(),
                        });
                    }
                }
            }

            match spec {
                NodeSpec::Subgraph(sub) => {
                    for input in sub.inputs.keys() {
                        let ok = input.starts_with(PARENT_PREFIX)
                            && matches!(sub.graph.node(input), Some(NodeSpec::Value { .. }));
                        if !ok {
                            return Err(GraphDefinitionError::BadParentInput {
                                subgraph: id.clone(),
                                input: input.clone(),
                            });
                        }
                    }
                    sub.graph.validate()?;
                }
                NodeSpec::Map(map) => {
                    if !matches!(map.graph.node(ROW_NODE), Some(NodeSpec::Value { .. })) {
                        return Err(GraphDefinitionError::MissingRowNode { map: id.clone() });
                    }
                    for input in map.inputs.keys() {
                        if !matches!(map.graph.node(input), Some(NodeSpec::Value { .. })) {
                            return Err(GraphDefinitionError::BadMapInput {
                                map: id.clone(),
                                input: input.clone(),
                            });
                        }
                    }
                    map.graph.validate()?;
                }
                NodeSpec::Value { .. } | NodeSpec::Compute(_) => {}
            }
        }

        self.check_acyclic()
    }

    /// DFS three-color cycle check over the reference edges of this scope.
    fn check_acyclic(&self) -> Result<(), GraphDefinitionError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            spec: &'a GraphSpec,
            id: &'a str,
            marks: &mut FxHashMap<&'a str, Mark>,
        ) -> Result<(), GraphDefinitionError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(GraphDefinitionError::Cycle {
                        through: id.to_string(),
                    });
                }
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(node) = spec.node(id) {
                for r in node.references() {
                    if spec.node(&r.node).is_some() {
                        visit(spec, &r.node, marks)?;
                    }
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        let mut marks = FxHashMap::default();
        for (id, _) in &self.nodes {
            visit(self, id, &mut marks)?;
        }
        Ok(())
    }
}
