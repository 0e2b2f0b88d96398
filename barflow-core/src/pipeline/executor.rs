//! Level-by-level graph executor.
//!
//! Every node runs at most once. A level starts only after the previous one
//! has finished, which makes the join node a barrier over all branches. Within
//! a level nodes run in order, or on a rayon pool when parallelism > 1.

use super::context::{CancellationToken, Diagnostic, Diagnostics, NodeContext, Outcome};
use super::error::StepError;
use super::graph::{Graph, NodeId};
use super::node::{Arity, FailurePolicy, NodeInputs, PortValue};
use crate::domain::TimeSeries;
use rayon::prelude::*;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Lifecycle of one node in one execution.
#[derive(Debug, Clone)]
pub enum NodeState {
    Pending,
    Running,
    Succeeded,
    Failed(StepError),
    /// A single-arity upstream was absent, so the node never ran.
    Skipped,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeState::Pending | NodeState::Running)
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            NodeState::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Ordered record of what the executor did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Started(NodeId),
    Finished(NodeId),
    Skipped(NodeId),
}

/// States, outputs and trace of a finished (or stopped) execution.
#[derive(Debug)]
pub struct Execution {
    states: Vec<NodeState>,
    outputs: Vec<Option<TimeSeries>>,
    trace: Vec<TraceEvent>,
}

impl Execution {
    pub fn state(&self, id: NodeId) -> &NodeState {
        &self.states[id.index()]
    }

    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    pub fn output(&self, id: NodeId) -> Option<&TimeSeries> {
        self.outputs[id.index()].as_ref()
    }

    pub fn take_output(&mut self, id: NodeId) -> Option<TimeSeries> {
        self.outputs[id.index()].take()
    }

    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Position of an event in the trace.
    pub fn position(&self, event: TraceEvent) -> Option<usize> {
        self.trace.iter().position(|e| *e == event)
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("node '{node}' failed and aborted the run: {error}")]
    Aborted {
        node: String,
        error: StepError,
        execution: Box<Execution>,
    },

    #[error("run cancelled")]
    Cancelled { execution: Box<Execution> },
}

pub struct Executor {
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// Run levels on a dedicated pool of `threads` workers; 0 or 1 means sequential.
    pub fn with_parallelism(threads: usize) -> Result<Self, ExecutionError> {
        if threads <= 1 {
            return Ok(Self::sequential());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("barflow-worker-{i}"))
            .build()
            .map_err(|e| ExecutionError::ThreadPool(e.to_string()))?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn parallelism(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    pub fn run(
        &self,
        graph: &Graph,
        diagnostics: &Diagnostics,
        cancel: &CancellationToken,
    ) -> Result<Execution, ExecutionError> {
        let mut states = vec![NodeState::Pending; graph.len()];
        let mut outputs: Vec<Option<TimeSeries>> = vec![None; graph.len()];
        let trace = Mutex::new(Vec::new());

        for (depth, level) in graph.levels().iter().enumerate() {
            if cancel.is_cancelled() {
                for id in graph.ids() {
                    if matches!(states[id.index()], NodeState::Pending) {
                        record_failure(graph, id, &StepError::Cancelled, diagnostics);
                        states[id.index()] = NodeState::Failed(StepError::Cancelled);
                    }
                }
                let execution = finish(states, outputs, trace);
                return Err(ExecutionError::Cancelled {
                    execution: Box::new(execution),
                });
            }

            let mut runnable = Vec::with_capacity(level.len());
            for &id in level {
                match gather_inputs(graph, id, &outputs) {
                    Some(inputs) => {
                        states[id.index()] = NodeState::Running;
                        runnable.push((id, inputs));
                    }
                    None => {
                        states[id.index()] = NodeState::Skipped;
                        push(&trace, TraceEvent::Skipped(id));
                        let node = graph.node(id);
                        diagnostics.record(Diagnostic {
                            symbol: node.symbol().map(str::to_string),
                            stage: node.stage(),
                            outcome: Outcome::Skipped,
                            detail: "upstream produced no output".into(),
                        });
                    }
                }
            }

            debug!(level = depth, nodes = runnable.len(), "running level");
            let run = |(id, inputs): (NodeId, NodeInputs)| {
                (id, run_node(graph, id, inputs, diagnostics, cancel, &trace))
            };
            let results: Vec<(NodeId, Result<TimeSeries, StepError>)> = match &self.pool {
                Some(pool) => pool.install(|| runnable.into_par_iter().map(run).collect()),
                None => runnable.into_iter().map(run).collect(),
            };

            let mut abort = None;
            for (id, result) in results {
                match result {
                    Ok(series) => {
                        states[id.index()] = NodeState::Succeeded;
                        outputs[id.index()] = Some(series);
                    }
                    Err(error) => {
                        record_failure(graph, id, &error, diagnostics);
                        if graph.node(id).failure_policy() == FailurePolicy::Abort
                            && abort.is_none()
                        {
                            abort = Some((id, error.clone()));
                        }
                        states[id.index()] = NodeState::Failed(error);
                    }
                }
            }

            if let Some((id, error)) = abort {
                let execution = finish(states, outputs, trace);
                return Err(ExecutionError::Aborted {
                    node: graph.name(id).to_string(),
                    error,
                    execution: Box::new(execution),
                });
            }
        }

        Ok(finish(states, outputs, trace))
    }
}

/// Collect a node's inputs, or `None` if a single-arity upstream is absent.
fn gather_inputs(
    graph: &Graph,
    id: NodeId,
    outputs: &[Option<TimeSeries>],
) -> Option<NodeInputs> {
    let mut inputs = NodeInputs::new();
    for wiring in graph.inputs(id) {
        let value = match wiring.arity {
            Arity::One => {
                let source = wiring.sources.first()?;
                PortValue::One(outputs[source.index()].clone()?)
            }
            Arity::Many => PortValue::Many(
                wiring
                    .sources
                    .iter()
                    .map(|s| outputs[s.index()].clone())
                    .collect(),
            ),
        };
        inputs.insert(wiring.port, value);
    }
    Some(inputs)
}

fn run_node(
    graph: &Graph,
    id: NodeId,
    inputs: NodeInputs,
    diagnostics: &Diagnostics,
    cancel: &CancellationToken,
    trace: &Mutex<Vec<TraceEvent>>,
) -> Result<TimeSeries, StepError> {
    let node = graph.node(id);
    push(trace, TraceEvent::Started(id));
    debug!(node = node.name(), "node started");

    let ctx = NodeContext::new(node.symbol(), node.stage(), diagnostics, cancel);
    let result = node.run(&ctx, inputs);

    push(trace, TraceEvent::Finished(id));
    debug!(node = node.name(), ok = result.is_ok(), "node finished");
    result
}

fn record_failure(graph: &Graph, id: NodeId, error: &StepError, diagnostics: &Diagnostics) {
    let node = graph.node(id);
    diagnostics.record(Diagnostic {
        symbol: node.symbol().map(str::to_string),
        stage: node.stage(),
        outcome: Outcome::Failed,
        detail: error.to_string(),
    });
}

fn push(trace: &Mutex<Vec<TraceEvent>>, event: TraceEvent) {
    trace
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .push(event);
}

fn finish(
    states: Vec<NodeState>,
    outputs: Vec<Option<TimeSeries>>,
    trace: Mutex<Vec<TraceEvent>>,
) -> Execution {
    Execution {
        states,
        outputs,
        trace: trace.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()),
    }
}
