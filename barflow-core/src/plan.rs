//! Assembles the per-symbol branches and the join node into one graph.

use crate::data::provider::DataProvider;
use crate::domain::{DateWindow, Symbol};
use crate::indicators::RollingVwap;
use crate::pipeline::{Graph, GraphBuilder, GraphError, NodeId, Stage};
use crate::steps::{AggregateNode, CleanNode, FetchNode, MergeNode, ValidateNode};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Parameters shared by every branch of a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window: DateWindow,
    pub fetch_timeout: Duration,
    pub vwap: RollingVwap,
}

/// Node ids of one symbol's branch.
#[derive(Debug, Clone)]
pub struct Branch {
    pub symbol: Symbol,
    pub fetch: NodeId,
    pub validate: NodeId,
    pub clean: NodeId,
    pub aggregate: NodeId,
}

impl Branch {
    /// Nodes in pipeline order.
    pub fn stages(&self) -> [(Stage, NodeId); 4] {
        [
            (Stage::Fetch, self.fetch),
            (Stage::Validate, self.validate),
            (Stage::Clean, self.clean),
            (Stage::Aggregate, self.aggregate),
        ]
    }
}

#[derive(Debug)]
pub struct PipelinePlan {
    graph: Graph,
    branches: Vec<Branch>,
    merge: NodeId,
}

impl PipelinePlan {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn merge(&self) -> NodeId {
        self.merge
    }

    /// One line per dependency level.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (depth, level) in self.graph.levels().iter().enumerate() {
            let names: Vec<&str> = level.iter().map(|id| self.graph.name(*id)).collect();
            let _ = writeln!(out, "level {depth}: {}", names.join(", "));
        }
        out
    }
}

/// `fetch -> validate -> clean -> aggregate` per symbol, all feeding `merge`.
///
/// Branches are wired into the join in the order of `symbols`.
pub fn build_pipeline(
    symbols: &[Symbol],
    provider: Arc<dyn DataProvider>,
    settings: &PipelineSettings,
) -> Result<PipelinePlan, GraphError> {
    let mut builder = GraphBuilder::new();
    let mut branches = Vec::with_capacity(symbols.len());

    for symbol in symbols {
        let fetch = builder.add_node(FetchNode::new(
            symbol.clone(),
            Arc::clone(&provider),
            settings.window,
            settings.fetch_timeout,
        ))?;
        let validate = builder.add_node(ValidateNode::new(symbol.clone()))?;
        let clean = builder.add_node(CleanNode::new(symbol.clone()))?;
        let aggregate =
            builder.add_node(AggregateNode::new(symbol.clone(), settings.vwap.clone()))?;

        builder.connect(fetch, validate, ValidateNode::INPUT)?;
        builder.connect(validate, clean, CleanNode::INPUT)?;
        builder.connect(clean, aggregate, AggregateNode::INPUT)?;

        branches.push(Branch {
            symbol: symbol.clone(),
            fetch,
            validate,
            clean,
            aggregate,
        });
    }

    let merge = builder.add_node(MergeNode)?;
    for branch in &branches {
        builder.connect(branch.aggregate, merge, MergeNode::INPUT)?;
    }

    Ok(PipelinePlan {
        graph: builder.build()?,
        branches,
        merge,
    })
}
