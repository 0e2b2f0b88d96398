//! Graph builder and the validated, topologically ordered graph.
//!
//! All structural checks happen while wiring or in `build()`, so an executor
//! never sees a graph with dangling inputs, cycles or incompatible schemas.

use super::node::{Arity, InputPort, Node};
use crate::data::schema::BarSchema;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Index of a node inside its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("node {0} does not belong to this graph")]
    UnknownNode(NodeId),

    #[error("node '{node}' has no input named '{port}'")]
    UnknownInput { node: String, port: String },

    #[error("'{from}' cannot feed '{to}.{port}': incompatible columns {columns:?}")]
    SchemaMismatch {
        from: String,
        to: String,
        port: String,
        columns: Vec<String>,
    },

    #[error("input '{node}.{port}' is already wired")]
    InputAlreadyWired { node: String, port: String },

    #[error("edge '{from}' -> '{to}' would create a cycle")]
    Cycle { from: String, to: String },

    #[error("input '{node}.{port}' is not wired")]
    UnwiredInput { node: String, port: String },

    #[error("duplicate node name '{0}'")]
    DuplicateName(String),
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: NodeId,
    to: NodeId,
    port: &'static str,
}

struct Slot {
    node: Arc<dyn Node>,
    ports: Vec<InputPort>,
}

/// Incrementally wires nodes, rejecting bad edges as they are added.
#[derive(Default)]
pub struct GraphBuilder {
    slots: Vec<Slot>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Node + 'static) -> Result<NodeId, GraphError> {
        self.add_shared(Arc::new(node))
    }

    pub fn add_shared(&mut self, node: Arc<dyn Node>) -> Result<NodeId, GraphError> {
        if self.slots.iter().any(|s| s.node.name() == node.name()) {
            return Err(GraphError::DuplicateName(node.name().to_string()));
        }
        let ports = node.inputs();
        self.slots.push(Slot { node, ports });
        Ok(NodeId(self.slots.len() - 1))
    }

    /// Wire the output of `from` into input `port` of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId, port: &str) -> Result<(), GraphError> {
        let source = self.slot(from)?;
        let target = self.slot(to)?;

        let input = target
            .ports
            .iter()
            .find(|p| p.name == port)
            .ok_or_else(|| GraphError::UnknownInput {
                node: target.node.name().to_string(),
                port: port.to_string(),
            })?;

        let columns = BarSchema::incompatible_columns(&source.node.output_schema(), &input.schema);
        if !columns.is_empty() {
            return Err(GraphError::SchemaMismatch {
                from: source.node.name().to_string(),
                to: target.node.name().to_string(),
                port: port.to_string(),
                columns,
            });
        }

        if input.arity == Arity::One
            && self.edges.iter().any(|e| e.to == to && e.port == input.name)
        {
            return Err(GraphError::InputAlreadyWired {
                node: target.node.name().to_string(),
                port: port.to_string(),
            });
        }

        if from == to || self.reaches(to, from) {
            return Err(GraphError::Cycle {
                from: source.node.name().to_string(),
                to: target.node.name().to_string(),
            });
        }

        let port = input.name;
        self.edges.push(Edge { from, to, port });
        Ok(())
    }

    /// Check every input is wired, then order the nodes.
    pub fn build(self) -> Result<Graph, GraphError> {
        for (index, slot) in self.slots.iter().enumerate() {
            for port in &slot.ports {
                let wired = self
                    .edges
                    .iter()
                    .any(|e| e.to.0 == index && e.port == port.name);
                if !wired {
                    return Err(GraphError::UnwiredInput {
                        node: slot.node.name().to_string(),
                        port: port.name.to_string(),
                    });
                }
            }
        }

        let order = self.topological_order()?;
        let levels = self.levels(&order);
        let inputs = self.input_wiring();

        Ok(Graph {
            nodes: self.slots.into_iter().map(|s| s.node).collect(),
            inputs,
            order,
            levels,
        })
    }

    fn slot(&self, id: NodeId) -> Result<&Slot, GraphError> {
        self.slots.get(id.0).ok_or(GraphError::UnknownNode(id))
    }

    /// Whether `to` is reachable from `from` over existing edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.slots.len()];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if std::mem::replace(&mut seen[id.0], true) {
                continue;
            }
            stack.extend(self.edges.iter().filter(|e| e.from == id).map(|e| e.to));
        }
        false
    }

    /// Kahn's algorithm; ready nodes are taken in insertion order.
    fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let n = self.slots.len();
        let mut in_degree = vec![0usize; n];
        for edge in &self.edges {
            in_degree[edge.to.0] += 1;
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = ready.pop_front() {
            order.push(NodeId(i));
            for edge in self.edges.iter().filter(|e| e.from.0 == i) {
                in_degree[edge.to.0] -= 1;
                if in_degree[edge.to.0] == 0 {
                    ready.push_back(edge.to.0);
                }
            }
            ready.make_contiguous().sort_unstable();
        }

        if order.len() != n {
            let stuck = (0..n).find(|&i| in_degree[i] > 0).unwrap_or(0);
            let name = self.slots[stuck].node.name().to_string();
            return Err(GraphError::Cycle {
                from: name.clone(),
                to: name,
            });
        }
        Ok(order)
    }

    /// Level of a node: 0 for sources, else one past its deepest upstream.
    fn levels(&self, order: &[NodeId]) -> Vec<Vec<NodeId>> {
        let mut depth = vec![0usize; self.slots.len()];
        for id in order {
            depth[id.0] = self
                .edges
                .iter()
                .filter(|e| e.to == *id)
                .map(|e| depth[e.from.0] + 1)
                .max()
                .unwrap_or(0);
        }

        let height = depth.iter().max().map_or(0, |d| d + 1);
        let mut levels = vec![Vec::new(); height];
        for (index, d) in depth.iter().enumerate() {
            levels[*d].push(NodeId(index));
        }
        levels
    }

    fn input_wiring(&self) -> Vec<Vec<Wiring>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ports
                    .iter()
                    .map(|port| Wiring {
                        port: port.name,
                        arity: port.arity,
                        sources: self
                            .edges
                            .iter()
                            .filter(|e| e.to.0 == index && e.port == port.name)
                            .map(|e| e.from)
                            .collect(),
                    })
                    .collect()
            })
            .collect()
    }
}

/// Upstreams feeding one input port, in wiring order.
#[derive(Debug, Clone)]
pub struct Wiring {
    pub port: &'static str,
    pub arity: Arity,
    pub sources: Vec<NodeId>,
}

/// A validated DAG with its execution order.
pub struct Graph {
    nodes: Vec<Arc<dyn Node>>,
    inputs: Vec<Vec<Wiring>>,
    order: Vec<NodeId>,
    levels: Vec<Vec<NodeId>>,
}

impl Graph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &dyn Node {
        self.nodes[id.0].as_ref()
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.nodes[id.0].name()
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name() == name).map(NodeId)
    }

    /// Input wiring of a node, one entry per declared port.
    pub fn inputs(&self, id: NodeId) -> &[Wiring] {
        &self.inputs[id.0]
    }

    /// Topological order; ties broken by insertion order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Nodes grouped by dependency depth.
    pub fn levels(&self) -> &[Vec<NodeId>] {
        &self.levels
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.iter().map(|n| n.name()).collect::<Vec<_>>())
            .field("levels", &self.levels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::columns;
    use crate::domain::TimeSeries;
    use crate::pipeline::context::{NodeContext, Stage};
    use crate::pipeline::error::StepError;
    use crate::pipeline::node::NodeInputs;
    use polars::prelude::{DataType, Field, Schema};

    struct Stub {
        name: &'static str,
        ports: Vec<InputPort>,
        output: Schema,
    }

    impl Node for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn stage(&self) -> Stage {
            Stage::Validate
        }
        fn inputs(&self) -> Vec<InputPort> {
            self.ports.clone()
        }
        fn output_schema(&self) -> Schema {
            self.output.clone()
        }
        fn run(&self, _: &NodeContext<'_>, _: NodeInputs) -> Result<TimeSeries, StepError> {
            unreachable!()
        }
    }

    fn schema() -> Schema {
        BarSchema::raw()
    }

    fn source(name: &'static str) -> Stub {
        Stub {
            name,
            ports: vec![],
            output: schema(),
        }
    }

    fn sink(name: &'static str, arity: Arity) -> Stub {
        Stub {
            name,
            ports: vec![InputPort {
                name: "input",
                schema: schema(),
                arity,
            }],
            output: schema(),
        }
    }

    #[test]
    fn orders_chain_and_levels() {
        let mut b = GraphBuilder::new();
        let c = b.add_node(sink("c", Arity::One)).unwrap();
        let a = b.add_node(source("a")).unwrap();
        let bb = b.add_node(sink("b", Arity::One)).unwrap();
        b.connect(a, bb, "input").unwrap();
        b.connect(bb, c, "input").unwrap();
        let graph = b.build().unwrap();

        assert_eq!(graph.order(), &[a, bb, c]);
        assert_eq!(graph.levels(), &[vec![a], vec![bb], vec![c]]);
    }

    #[test]
    fn independent_sources_share_a_level() {
        let mut b = GraphBuilder::new();
        let x = b.add_node(source("x")).unwrap();
        let y = b.add_node(source("y")).unwrap();
        let join = b.add_node(sink("join", Arity::Many)).unwrap();
        b.connect(x, join, "input").unwrap();
        b.connect(y, join, "input").unwrap();
        let graph = b.build().unwrap();

        assert_eq!(graph.levels()[0], vec![x, y]);
        assert_eq!(graph.inputs(join)[0].sources, vec![x, y]);
    }

    #[test]
    fn rejects_unknown_port() {
        let mut b = GraphBuilder::new();
        let a = b.add_node(source("a")).unwrap();
        let s = b.add_node(sink("s", Arity::One)).unwrap();
        assert!(matches!(
            b.connect(a, s, "nope"),
            Err(GraphError::UnknownInput { .. })
        ));
    }

    #[test]
    fn rejects_missing_columns() {
        let mut b = GraphBuilder::new();
        let narrow = b
            .add_node(Stub {
                name: "narrow",
                ports: vec![],
                output: Schema::from_iter(vec![Field::new(
                    columns::TIMESTAMP.into(),
                    DataType::Int64,
                )]),
            })
            .unwrap();
        let s = b.add_node(sink("s", Arity::One)).unwrap();
        let err = b.connect(narrow, s, "input").unwrap_err();
        match err {
            GraphError::SchemaMismatch { columns: cols, .. } => {
                assert!(cols.contains(&columns::TIMESTAMP.to_string()));
                assert!(cols.contains(&columns::VOLUME.to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_second_edge_into_single_port() {
        let mut b = GraphBuilder::new();
        let a = b.add_node(source("a")).unwrap();
        let a2 = b.add_node(source("a2")).unwrap();
        let s = b.add_node(sink("s", Arity::One)).unwrap();
        b.connect(a, s, "input").unwrap();
        assert!(matches!(
            b.connect(a2, s, "input"),
            Err(GraphError::InputAlreadyWired { .. })
        ));
    }

    #[test]
    fn rejects_cycles() {
        let mut b = GraphBuilder::new();
        let p = b.add_node(sink("p", Arity::Many)).unwrap();
        let q = b.add_node(sink("q", Arity::Many)).unwrap();
        b.connect(p, q, "input").unwrap();
        assert!(matches!(b.connect(q, p, "input"), Err(GraphError::Cycle { .. })));
        assert!(matches!(b.connect(p, p, "input"), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn rejects_unwired_inputs_at_build() {
        let mut b = GraphBuilder::new();
        b.add_node(sink("s", Arity::One)).unwrap();
        assert!(matches!(b.build(), Err(GraphError::UnwiredInput { .. })));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut b = GraphBuilder::new();
        b.add_node(source("a")).unwrap();
        assert!(matches!(
            b.add_node(source("a")),
            Err(GraphError::DuplicateName(_))
        ));
    }
}
