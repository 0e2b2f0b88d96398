//! Pipeline engine: typed nodes, graph wiring and level-by-level execution.

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;

pub use context::{CancellationToken, Diagnostic, Diagnostics, NodeContext, Outcome, Stage};
pub use error::{MergeError, StepError, UndefinedAggregateError};
pub use executor::{Execution, ExecutionError, Executor, NodeState, TraceEvent};
pub use graph::{Graph, GraphBuilder, GraphError, NodeId};
pub use node::{Arity, FailurePolicy, InputPort, Node, NodeInputs, PortValue};
