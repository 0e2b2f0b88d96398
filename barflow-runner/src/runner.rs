//! Run orchestration: provider, graph, execution, sink handoff.
//!
//! Two entry points:
//! - `run()`: builds the configured provider and file sink. Used by the CLI.
//! - `run_with()`: takes an explicit provider and sink. Used by tests and
//!   callers with their own adapters.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use barflow_core::data::{
    file_sink, Ack, DataProvider, FetchError, Sink, SyntheticProvider, WriteError, YahooProvider,
};
use barflow_core::domain::Symbol;
use barflow_core::pipeline::{
    CancellationToken, Diagnostic, Diagnostics, Execution, ExecutionError, Executor, GraphError,
    MergeError, NodeState, Stage, StepError,
};
use barflow_core::plan::{build_pipeline, PipelinePlan};
use barflow_core::steps::merge_key;

use crate::config::{ConfigError, ProviderKind, RunConfig};

/// How one symbol's branch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome {
    Succeeded { symbol: Symbol, rows: usize },
    /// Fetched fine but had no rows (holiday, no trades).
    Empty { symbol: Symbol },
    Failed { symbol: Symbol, stage: Stage, reason: String },
}

impl BranchOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            BranchOutcome::Succeeded { symbol, .. }
            | BranchOutcome::Empty { symbol }
            | BranchOutcome::Failed { symbol, .. } => symbol,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BranchOutcome::Failed { .. })
    }
}

/// Errors from the runner. Run-fatal variants carry every branch's outcome.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("provider setup failed: {0}")]
    Provider(FetchError),

    #[error("executor setup failed: {0}")]
    Executor(String),

    #[error("merge failed: {source}")]
    Merge {
        source: MergeError,
        outcomes: Vec<BranchOutcome>,
    },

    #[error("node '{node}' aborted the run: {source}")]
    Aborted {
        node: String,
        source: StepError,
        outcomes: Vec<BranchOutcome>,
    },

    #[error("write failed: {source}")]
    Write {
        source: WriteError,
        outcomes: Vec<BranchOutcome>,
    },

    #[error("run cancelled")]
    Cancelled { outcomes: Vec<BranchOutcome> },
}

impl RunError {
    /// Per-symbol outcomes, empty for errors raised before execution.
    pub fn outcomes(&self) -> &[BranchOutcome] {
        match self {
            RunError::Merge { outcomes, .. }
            | RunError::Aborted { outcomes, .. }
            | RunError::Write { outcomes, .. }
            | RunError::Cancelled { outcomes } => outcomes,
            _ => &[],
        }
    }

    /// Symbols whose branch did not complete, for a manual retry.
    pub fn failed_symbols(&self) -> Vec<&str> {
        failed_symbols(self.outcomes())
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub key: String,
    pub rows: usize,
    pub ack: Ack,
    pub outcomes: Vec<BranchOutcome>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RunSummary {
    pub fn failed_symbols(&self) -> Vec<&str> {
        failed_symbols(&self.outcomes)
    }
}

fn failed_symbols(outcomes: &[BranchOutcome]) -> Vec<&str> {
    outcomes
        .iter()
        .filter(|o| o.is_failed())
        .map(BranchOutcome::symbol)
        .collect()
}

/// Build the provider named by the config.
pub fn build_provider(config: &RunConfig) -> Result<Arc<dyn DataProvider>, RunError> {
    Ok(match config.provider {
        ProviderKind::Yahoo => {
            Arc::new(YahooProvider::new(config.fetch_timeout()).map_err(RunError::Provider)?)
        }
        ProviderKind::Synthetic => Arc::new(SyntheticProvider::new()),
    })
}

/// Assemble the graph for `config` without running it.
pub fn plan_run(
    config: &RunConfig,
    today: NaiveDate,
    provider: Arc<dyn DataProvider>,
) -> Result<PipelinePlan, RunError> {
    config.validate()?;
    Ok(build_pipeline(
        &config.symbols,
        provider,
        &config.pipeline_settings(today),
    )?)
}

/// Run with the configured provider and file sink.
pub fn run(
    config: &RunConfig,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> Result<RunSummary, RunError> {
    let provider = build_provider(config)?;
    let sink = file_sink(config.output.format, config.output.dir.clone());
    run_with(config, today, provider, sink.as_ref(), cancel)
}

/// Run with an explicit provider and sink.
pub fn run_with(
    config: &RunConfig,
    today: NaiveDate,
    provider: Arc<dyn DataProvider>,
    sink: &dyn Sink,
    cancel: &CancellationToken,
) -> Result<RunSummary, RunError> {
    let plan = plan_run(config, today, provider)?;
    let executor = Executor::with_parallelism(config.execution.parallelism)
        .map_err(|e| RunError::Executor(e.to_string()))?;
    let diagnostics = Diagnostics::new();

    info!(
        symbols = ?config.symbols,
        window = %config.window(today),
        parallelism = executor.parallelism(),
        sink = sink.name(),
        "starting run"
    );

    let mut execution = match executor.run(plan.graph(), &diagnostics, cancel) {
        Ok(execution) => execution,
        Err(ExecutionError::Aborted {
            node,
            error,
            execution,
        }) => {
            let outcomes = branch_outcomes(&plan, &execution);
            return Err(match error {
                StepError::Merge(source) => RunError::Merge { source, outcomes },
                source => RunError::Aborted {
                    node,
                    source,
                    outcomes,
                },
            });
        }
        Err(ExecutionError::Cancelled { execution }) => {
            return Err(RunError::Cancelled {
                outcomes: branch_outcomes(&plan, &execution),
            });
        }
        Err(ExecutionError::ThreadPool(message)) => return Err(RunError::Executor(message)),
    };

    let outcomes = branch_outcomes(&plan, &execution);
    let Some(merged) = execution.take_output(plan.merge()) else {
        return Err(RunError::Merge {
            source: MergeError::NoBranches,
            outcomes,
        });
    };
    let key = match merge_key(&merged) {
        Ok(key) => key,
        Err(source) => return Err(RunError::Merge { source, outcomes }),
    };

    let ack = match sink.write(&merged, &key) {
        Ok(ack) => ack,
        Err(source) => return Err(RunError::Write { source, outcomes }),
    };

    info!(key = %ack.key, rows = ack.rows, location = %ack.location, "run complete");
    Ok(RunSummary {
        key,
        rows: merged.len(),
        ack,
        outcomes,
        diagnostics: diagnostics.snapshot(),
    })
}

/// Outcome of each branch: the first failed stage, else the row count.
pub fn branch_outcomes(plan: &PipelinePlan, execution: &Execution) -> Vec<BranchOutcome> {
    plan.branches()
        .iter()
        .map(|branch| {
            let symbol = branch.symbol.clone();
            for (stage, id) in branch.stages() {
                match execution.state(id) {
                    NodeState::Succeeded => continue,
                    NodeState::Failed(error) => {
                        return BranchOutcome::Failed {
                            symbol,
                            stage,
                            reason: error.to_string(),
                        }
                    }
                    NodeState::Skipped | NodeState::Pending | NodeState::Running => {
                        return BranchOutcome::Failed {
                            symbol,
                            stage,
                            reason: "did not run".into(),
                        }
                    }
                }
            }
            match execution.output(branch.aggregate).map(|s| s.len()) {
                Some(0) | None => BranchOutcome::Empty { symbol },
                Some(rows) => BranchOutcome::Succeeded { symbol, rows },
            }
        })
        .collect()
}
