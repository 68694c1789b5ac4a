//! Graph execution: dependency-ordered, conditionally gated, concurrently
//! scheduled interpretation of a [`GraphSpec`].
//!
//! An [`Executor`] owns one validated spec plus the capability registry.
//! External values are bound with [`inject`](Executor::inject) before
//! [`run`](Executor::run); a run creates fresh per-node state, executes
//! ready nodes in concurrent waves, propagates skips and failures along
//! reference edges, and collects the outputs of nodes flagged as results
//! into a [`ResultBag`]. Nothing is shared between independent runs except
//! the read-only spec and registry.
//!
//! # Semantics
//!
//! - A node is ready when every node it references (inputs, fan-out
//!   collection, activation condition) has reached a terminal state.
//! - `if`/`unless` gates evaluate against the condition node's *completed*
//!   output; a skipped or failed condition node propagates instead.
//! - A skipped input skips the dependent; a failed input fails it,
//!   unless the dependent tolerates with `any_input`, in which case it
//!   runs as long as at least one input resolved to a present value.
//! - `run` rejects only when a failure reaches a result node; failures
//!   absorbed by tolerance or dead-ended on non-result nodes are reported
//!   through [`errors`](Executor::errors) instead.
//! - Map fan-out runs at most `concurrency` nested instances at once and
//!   aggregates element results in input order; a failing element becomes
//!   an `{"onError": {...}}` entry at its index without cancelling its
//!   siblings.

use futures_util::future::{BoxFuture, join_all};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::errors::{FailureDetail, NodeFailure};
use crate::graph::{
    Activation, Binding, ComputeSpec, GraphDefinitionError, GraphSpec, MapSpec, NodeId, NodeSpec,
    RefExpr, ROW_NODE, SubgraphSpec,
};
use crate::registry::{CapabilityRegistry, NamedInputs};
use crate::utils::json_ext::{is_truthy, value_at_path};

/// Outputs of completed result nodes, keyed by node id.
///
/// A skipped result node contributes no key; consumers must treat a
/// missing key as "that branch did not run".
pub type ResultBag = BTreeMap<NodeId, Value>;

/// Default cap on concurrent nested runs inside a map fan-out.
pub const DEFAULT_MAP_CONCURRENCY: usize = 8;

#[derive(Clone, Debug)]
enum NodeState {
    Pending,
    Skipped,
    Completed(Value),
    Failed(FailureDetail),
}

impl NodeState {
    fn is_terminal(&self) -> bool {
        !matches!(self, NodeState::Pending)
    }
}

/// Errors surfaced by [`Executor`] operations.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Definition(#[from] GraphDefinitionError),

    #[error("node {node} failed: {error}")]
    #[diagnostic(code(podweave::executor::node_failed))]
    NodeFailed {
        node: String,
        #[source]
        error: FailureDetail,
    },

    #[error("cannot inject {name}: execution has already started")]
    #[diagnostic(code(podweave::executor::injection_after_start))]
    InjectionAfterStart { name: String },

    #[error("cannot inject {name}: no value node with that id")]
    #[diagnostic(
        code(podweave::executor::unknown_injection),
        help("Injection targets must be declared value nodes.")
    )]
    UnknownInjection { name: String },

    #[error("execution stalled with {remaining} unresolved nodes")]
    #[diagnostic(code(podweave::executor::stalled))]
    Stalled { remaining: usize },
}

/// Executes one [`GraphSpec`] against a capability registry.
pub struct Executor {
    spec: GraphSpec,
    registry: Arc<CapabilityRegistry>,
    injections: FxHashMap<String, Value>,
    failures: Vec<NodeFailure>,
    map_concurrency: usize,
    started: bool,
}

impl Executor {
    /// Validates the spec and prepares an executor for it.
    pub fn new(
        spec: GraphSpec,
        registry: Arc<CapabilityRegistry>,
    ) -> Result<Self, GraphDefinitionError> {
        spec.validate()?;
        Ok(Self {
            spec,
            registry,
            injections: FxHashMap::default(),
            failures: Vec::new(),
            map_concurrency: DEFAULT_MAP_CONCURRENCY,
            started: false,
        })
    }

    /// Override the default cap on concurrent map fan-out instances.
    #[must_use]
    pub fn with_map_concurrency(mut self, cap: usize) -> Self {
        self.map_concurrency = cap.max(1);
        self
    }

    /// Bind an external value to a declared value node before running.
    pub fn inject(&mut self, name: &str, value: Value) -> Result<(), ExecutorError> {
        if self.started {
            return Err(ExecutorError::InjectionAfterStart {
                name: name.to_string(),
            });
        }
        match self.spec.node(name) {
            Some(NodeSpec::Value { .. }) => {
                self.injections.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(ExecutorError::UnknownInjection {
                name: name.to_string(),
            }),
        }
    }

    /// Execute the graph to completion and collect the result bag.
    #[instrument(skip(self), fields(nodes = self.spec.nodes.len()))]
    pub async fn run(&mut self) -> Result<ResultBag, ExecutorError> {
        self.started = true;
        let outcome = run_graph(
            &self.spec,
            &self.registry,
            self.injections.clone(),
            self.map_concurrency,
        )
        .await;
        self.failures = outcome.failures;

        if let Some((node, error)) = outcome.rejection {
            return Err(ExecutorError::NodeFailed { node, error });
        }
        if outcome.stalled > 0 {
            return Err(ExecutorError::Stalled {
                remaining: outcome.stalled,
            });
        }
        Ok(outcome.bag)
    }

    /// Node-level failures collected during the last run, including those
    /// that did not cause the run to reject.
    pub fn errors(&self) -> &[NodeFailure] {
        &self.failures
    }
}

struct RunOutcome {
    bag: ResultBag,
    failures: Vec<NodeFailure>,
    /// First failure that reached a result node, if any.
    rejection: Option<(String, FailureDetail)>,
    stalled: usize,
}

enum Decision {
    Skip,
    FailUpstream(FailureDetail),
    Run(Work),
}

enum Work {
    Compute {
        capability: String,
        inputs: NamedInputs,
        params: Value,
        timeout_ms: Option<u64>,
        suppress_error: bool,
    },
    Subgraph {
        graph: GraphSpec,
        injections: FxHashMap<String, Value>,
    },
    Map {
        graph: GraphSpec,
        elements: Vec<Value>,
        constants: FxHashMap<String, Value>,
        concurrency: usize,
    },
}

/// One full nested-run execution; boxed for recursion through sub-graphs.
fn run_graph<'a>(
    spec: &'a GraphSpec,
    registry: &'a CapabilityRegistry,
    injections: FxHashMap<String, Value>,
    map_concurrency: usize,
) -> BoxFuture<'a, RunOutcome> {
    Box::pin(async move {
        let mut states: FxHashMap<&str, NodeState> = FxHashMap::default();
        let mut failures: Vec<NodeFailure> = Vec::new();

        for (id, node) in &spec.nodes {
            let state = match node {
                NodeSpec::Value { default } => {
                    let value = injections
                        .get(id.as_str())
                        .cloned()
                        .or_else(|| default.clone())
                        .unwrap_or(Value::Null);
                    NodeState::Completed(value)
                }
                _ => NodeState::Pending,
            };
            states.insert(id.as_str(), state);
        }

        loop {
            let mut immediate: Vec<(&str, NodeState)> = Vec::new();
            let mut runnable: Vec<(&str, Work)> = Vec::new();

            for (id, node) in &spec.nodes {
                if !matches!(states[id.as_str()], NodeState::Pending) {
                    continue;
                }
                let all_deps_terminal = node
                    .references()
                    .iter()
                    .all(|r| states.get(r.node.as_str()).is_some_and(NodeState::is_terminal));
                if !all_deps_terminal {
                    continue;
                }
                match decide(node, &states) {
                    Decision::Skip => immediate.push((id, NodeState::Skipped)),
                    Decision::FailUpstream(d) => immediate.push((id, NodeState::Failed(d))),
                    Decision::Run(work) => runnable.push((id, work)),
                }
            }

            if immediate.is_empty() && runnable.is_empty() {
                break;
            }

            if !immediate.is_empty() {
                for (id, state) in immediate {
                    debug!(node = id, terminal = ?state_label(&state), "node resolved without execution");
                    states.insert(id, state);
                }
                // Re-evaluate readiness before dispatching async work so
                // propagated skips settle first.
                continue;
            }

            let wave = runnable.into_iter().map(|(id, work)| async move {
                (id, execute_work(id, work, registry, map_concurrency).await)
            });
            for (id, (state, mut wave_failures)) in join_all(wave).await {
                if let NodeState::Failed(detail) = &state {
                    warn!(node = id, error = %detail, "node failed");
                }
                states.insert(id, state);
                failures.append(&mut wave_failures);
            }
        }

        let mut bag = ResultBag::new();
        let mut rejection = None;
        let mut stalled = 0;
        for (id, node) in &spec.nodes {
            match &states[id.as_str()] {
                NodeState::Completed(value) if node.is_result() => {
                    bag.insert(id.clone(), value.clone());
                }
                NodeState::Failed(detail) if node.is_result() && rejection.is_none() => {
                    rejection = Some((id.clone(), detail.clone()));
                }
                NodeState::Pending => stalled += 1,
                _ => {}
            }
        }

        RunOutcome {
            bag,
            failures,
            rejection,
            stalled,
        }
    })
}

fn state_label(state: &NodeState) -> &'static str {
    match state {
        NodeState::Pending => "pending",
        NodeState::Skipped => "skipped",
        NodeState::Completed(_) => "completed",
        NodeState::Failed(_) => "failed",
    }
}

/// How a reference resolved against the current run state.
enum Resolved {
    Present(Value),
    Absent,
    Skipped,
    Failed(FailureDetail),
}

fn resolve_ref(states: &FxHashMap<&str, NodeState>, r: &RefExpr) -> Resolved {
    match &states[r.node.as_str()] {
        NodeState::Completed(v) => match value_at_path(v, &r.path) {
            Some(x) if !x.is_null() => Resolved::Present(x.clone()),
            _ => Resolved::Absent,
        },
        NodeState::Skipped => Resolved::Skipped,
        NodeState::Failed(d) => Resolved::Failed(d.clone()),
        NodeState::Pending => Resolved::Absent,
    }
}

/// Resolve a binding map into concrete inputs, or short-circuit into a
/// skip/fail decision per the propagation rules.
fn resolve_inputs(
    bindings: &BTreeMap<String, Binding>,
    states: &FxHashMap<&str, NodeState>,
    any_input: bool,
) -> Result<FxHashMap<String, Value>, Decision> {
    let mut resolved = FxHashMap::default();
    let mut first_failure: Option<FailureDetail> = None;
    let mut saw_gap = false;

    for (name, binding) in bindings {
        match binding {
            Binding::Literal(v) => {
                resolved.insert(name.clone(), v.clone());
            }
            Binding::Ref(r) => match resolve_ref(states, r) {
                Resolved::Present(v) => {
                    resolved.insert(name.clone(), v);
                }
                Resolved::Absent => {
                    if any_input {
                        saw_gap = true;
                    }
                }
                Resolved::Skipped => {
                    if !any_input {
                        return Err(Decision::Skip);
                    }
                    saw_gap = true;
                }
                Resolved::Failed(d) => {
                    if !any_input {
                        return Err(Decision::FailUpstream(d));
                    }
                    first_failure.get_or_insert(d);
                    saw_gap = true;
                }
            },
        }
    }

    if any_input && resolved.is_empty() && saw_gap {
        return Err(match first_failure {
            Some(d) => Decision::FailUpstream(d),
            None => Decision::Skip,
        });
    }
    Ok(resolved)
}

fn decide(node: &NodeSpec, states: &FxHashMap<&str, NodeState>) -> Decision {
    // Gates first: a gated-off node skips even when an input has failed,
    // which is what keeps an irrelevant branch failure from rejecting the
    // whole run.
    match node.activation() {
        Activation::Always => {}
        Activation::If(r) => match &states[r.node.as_str()] {
            NodeState::Completed(v) => {
                let cond = value_at_path(v, &r.path).unwrap_or(&Value::Null);
                if !is_truthy(cond) {
                    return Decision::Skip;
                }
            }
            NodeState::Skipped => return Decision::Skip,
            NodeState::Failed(d) => return Decision::FailUpstream(d.clone()),
            NodeState::Pending => return Decision::Skip,
        },
        Activation::Unless(r) => match &states[r.node.as_str()] {
            NodeState::Completed(v) => {
                let cond = value_at_path(v, &r.path).unwrap_or(&Value::Null);
                if is_truthy(cond) {
                    return Decision::Skip;
                }
            }
            NodeState::Skipped => return Decision::Skip,
            NodeState::Failed(d) => return Decision::FailUpstream(d.clone()),
            NodeState::Pending => return Decision::Skip,
        },
    }

    match node {
        NodeSpec::Value { .. } => Decision::Skip,
        NodeSpec::Compute(c) => decide_compute(c, states),
        NodeSpec::Subgraph(s) => decide_subgraph(s, states),
        NodeSpec::Map(m) => decide_map(m, states),
    }
}

fn decide_compute(c: &ComputeSpec, states: &FxHashMap<&str, NodeState>) -> Decision {
    let inputs = match resolve_inputs(&c.inputs, states, c.any_input) {
        Ok(inputs) => inputs,
        Err(decision) => return decision,
    };
    Decision::Run(Work::Compute {
        capability: c.capability.clone(),
        inputs: inputs.into_iter().collect(),
        params: c.params.clone(),
        timeout_ms: c.timeout_ms,
        suppress_error: c.suppress_error,
    })
}

fn decide_subgraph(s: &SubgraphSpec, states: &FxHashMap<&str, NodeState>) -> Decision {
    let inputs = match resolve_inputs(&s.inputs, states, false) {
        Ok(inputs) => inputs,
        Err(decision) => return decision,
    };
    Decision::Run(Work::Subgraph {
        graph: s.graph.clone(),
        injections: inputs,
    })
}

fn decide_map(m: &MapSpec, states: &FxHashMap<&str, NodeState>) -> Decision {
    let over = match &m.over {
        Binding::Literal(v) => v.clone(),
        Binding::Ref(r) => match resolve_ref(states, r) {
            Resolved::Present(v) => v,
            Resolved::Absent => Value::Array(Vec::new()),
            Resolved::Skipped => return Decision::Skip,
            Resolved::Failed(d) => return Decision::FailUpstream(d),
        },
    };
    let Value::Array(elements) = over else {
        return Decision::FailUpstream(FailureDetail::msg(
            "map input did not resolve to a sequence",
        ));
    };
    let constants = match resolve_inputs(&m.inputs, states, false) {
        Ok(inputs) => inputs,
        Err(decision) => return decision,
    };
    Decision::Run(Work::Map {
        graph: m.graph.clone(),
        elements,
        constants,
        concurrency: m.concurrency.unwrap_or(0),
    })
}

async fn execute_work(
    id: &str,
    work: Work,
    registry: &CapabilityRegistry,
    map_concurrency: usize,
) -> (NodeState, Vec<NodeFailure>) {
    match work {
        Work::Compute {
            capability,
            inputs,
            params,
            timeout_ms,
            suppress_error,
        } => {
            // Lookup happens at invocation time so an unknown name fails
            // the node instead of aborting the decision phase.
            let result = match registry.resolve(&capability) {
                Ok(cap) => {
                    let invocation = cap.invoke(inputs, &params);
                    match timeout_ms {
                        Some(ms) => {
                            crate::registry::with_timeout(&capability, ms, invocation).await
                        }
                        None => invocation.await,
                    }
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(value) => (NodeState::Completed(value), Vec::new()),
                Err(e) if suppress_error => {
                    debug!(node = id, error = %e, "capability error suppressed");
                    (NodeState::Completed(e.detail().to_on_error()), Vec::new())
                }
                Err(e) => {
                    let detail = e.detail();
                    let failure = NodeFailure::new(id, detail.clone());
                    (NodeState::Failed(detail), vec![failure])
                }
            }
        }
        Work::Subgraph { graph, injections } => {
            let outcome = run_graph(&graph, registry, injections, map_concurrency).await;
            let failures = outcome
                .failures
                .into_iter()
                .map(|f| f.scoped(id))
                .collect();
            match outcome.rejection {
                Some((_, detail)) => (NodeState::Failed(detail), failures),
                None => {
                    let object: Map<String, Value> = outcome.bag.into_iter().collect();
                    (NodeState::Completed(Value::Object(object)), failures)
                }
            }
        }
        Work::Map {
            graph,
            elements,
            constants,
            concurrency,
        } => {
            let cap = if concurrency > 0 {
                concurrency
            } else {
                map_concurrency
            };
            let semaphore = Semaphore::new(cap);
            let graph = &graph;
            let constants = &constants;
            let semaphore = &semaphore;
            let instances = elements.into_iter().enumerate().map(|(index, element)| {
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore never closed");
                    let mut injections = constants.clone();
                    injections.insert(ROW_NODE.to_string(), element);
                    let outcome = run_graph(graph, registry, injections, map_concurrency).await;
                    (index, outcome)
                }
            });

            let mut aggregated = Vec::new();
            let mut failures = Vec::new();
            for (index, outcome) in join_all(instances).await {
                let scope = format!("{id}[{index}]");
                failures.extend(outcome.failures.into_iter().map(|f| f.scoped(&scope)));
                match outcome.rejection {
                    Some((node, detail)) => {
                        failures.push(NodeFailure::new(format!("{scope}.{node}"), detail.clone()));
                        aggregated.push(detail.to_on_error());
                    }
                    None => {
                        let object: Map<String, Value> = outcome.bag.into_iter().collect();
                        aggregated.push(Value::Object(object));
                    }
                }
            }
            (NodeState::Completed(Value::Array(aggregated)), failures)
        }
    }
}
