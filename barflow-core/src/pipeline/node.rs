//! Node trait: a typed unit of computation with declared schemas.

use super::context::{NodeContext, Stage};
use super::error::StepError;
use crate::domain::TimeSeries;
use polars::prelude::Schema;
use std::collections::HashMap;

/// How many upstream edges an input port accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly one edge. The node is skipped when that upstream is absent.
    One,
    /// Any number of edges, delivered in wiring order with absent slots.
    Many,
}

/// What happens to the run when a node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The node's output is absent; downstream `One` inputs are skipped.
    #[default]
    Degrade,
    /// The run stops.
    Abort,
}

/// A named input with the columns it requires.
#[derive(Debug, Clone)]
pub struct InputPort {
    pub name: &'static str,
    pub schema: Schema,
    pub arity: Arity,
}

impl InputPort {
    pub fn one(name: &'static str, schema: Schema) -> Self {
        Self {
            name,
            schema,
            arity: Arity::One,
        }
    }

    pub fn many(name: &'static str, schema: Schema) -> Self {
        Self {
            name,
            schema,
            arity: Arity::Many,
        }
    }
}

/// Values delivered to one port.
#[derive(Debug, Clone)]
pub enum PortValue {
    One(TimeSeries),
    Many(Vec<Option<TimeSeries>>),
}

/// Inputs keyed by port name.
#[derive(Debug, Default)]
pub struct NodeInputs {
    values: HashMap<&'static str, PortValue>,
}

impl NodeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, port: &'static str, value: PortValue) {
        self.values.insert(port, value);
    }

    /// Take the value of a single-arity port.
    pub fn take_one(&mut self, port: &str) -> Result<TimeSeries, StepError> {
        match self.values.remove(port) {
            Some(PortValue::One(series)) => Ok(series),
            _ => Err(StepError::MissingInput(port.to_string())),
        }
    }

    /// Take the slots of a many-arity port.
    pub fn take_many(&mut self, port: &str) -> Result<Vec<Option<TimeSeries>>, StepError> {
        match self.values.remove(port) {
            Some(PortValue::Many(slots)) => Ok(slots),
            _ => Err(StepError::MissingInput(port.to_string())),
        }
    }
}

/// A pipeline node.
///
/// Given inputs that match [`inputs`](Node::inputs), `run` must return a series
/// matching [`output_schema`](Node::output_schema) or fail with a typed error.
pub trait Node: Send + Sync {
    /// Unique, human-readable node name, e.g. `aggregate[NFLX]`.
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    /// Symbol of the branch this node belongs to; `None` for join nodes.
    fn symbol(&self) -> Option<&str> {
        None
    }

    /// Declared inputs. Empty for source nodes.
    fn inputs(&self) -> Vec<InputPort> {
        Vec::new()
    }

    fn output_schema(&self) -> Schema;

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Degrade
    }

    fn run(&self, ctx: &NodeContext<'_>, inputs: NodeInputs) -> Result<TimeSeries, StepError>;
}
