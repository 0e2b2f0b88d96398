//! Per-run context handed to every node: cancellation and diagnostics.

use crate::domain::Symbol;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Cooperative cancellation flag shared between the run and its workers.
///
/// A child token is cancelled when it or any of its ancestors is; cancelling
/// a child leaves the parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    own: Arc<AtomicBool>,
    ancestors: Vec<Arc<AtomicBool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.own.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.own.load(Ordering::Relaxed) || self.ancestors.iter().any(|a| a.load(Ordering::Relaxed))
    }

    /// A token that also observes this one.
    pub fn child(&self) -> Self {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(Arc::clone(&self.own));
        Self {
            own: Arc::new(AtomicBool::new(false)),
            ancestors,
        }
    }
}

/// Pipeline stage a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Validate,
    Clean,
    Aggregate,
    Merge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Validate => "validate",
            Stage::Clean => "clean",
            Stage::Aggregate => "aggregate",
            Stage::Merge => "merge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result class of a stage for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Warning,
    Failed,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Ok => "ok",
            Outcome::Warning => "warning",
            Outcome::Failed => "failed",
            Outcome::Skipped => "skipped",
        })
    }
}

/// One structured diagnostic record. `symbol` is `None` for the join stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub symbol: Option<Symbol>,
    pub stage: Stage,
    pub outcome: Outcome,
    pub detail: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.symbol.as_deref().unwrap_or("*"),
            self.stage,
            self.outcome,
            self.detail
        )
    }
}

/// Run-scoped diagnostics buffer, mirrored to `tracing` as records arrive.
#[derive(Debug, Default)]
pub struct Diagnostics {
    records: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, diagnostic: Diagnostic) {
        let symbol = diagnostic.symbol.as_deref().unwrap_or("*");
        let stage = diagnostic.stage.as_str();
        let detail = diagnostic.detail.as_str();
        match diagnostic.outcome {
            Outcome::Ok => info!(symbol, stage, detail, "stage ok"),
            Outcome::Warning => warn!(symbol, stage, detail, "stage warning"),
            Outcome::Failed => error!(symbol, stage, detail, "stage failed"),
            Outcome::Skipped => warn!(symbol, stage, detail, "stage skipped"),
        }
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }

    /// Copy of every record so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn for_symbol(&self, symbol: &str) -> Vec<Diagnostic> {
        self.snapshot()
            .into_iter()
            .filter(|d| d.symbol.as_deref() == Some(symbol))
            .collect()
    }

    pub fn with_outcome(&self, outcome: Outcome) -> Vec<Diagnostic> {
        self.snapshot()
            .into_iter()
            .filter(|d| d.outcome == outcome)
            .collect()
    }
}

/// What a node sees of the run while it executes.
pub struct NodeContext<'a> {
    symbol: Option<&'a str>,
    stage: Stage,
    diagnostics: &'a Diagnostics,
    cancel: &'a CancellationToken,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        symbol: Option<&'a str>,
        stage: Stage,
        diagnostics: &'a Diagnostics,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            symbol,
            stage,
            diagnostics,
            cancel,
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn ok(&self, detail: impl Into<String>) {
        self.report(Outcome::Ok, detail.into());
    }

    pub fn warning(&self, detail: impl Into<String>) {
        self.report(Outcome::Warning, detail.into());
    }

    fn report(&self, outcome: Outcome, detail: String) {
        self.diagnostics.record(Diagnostic {
            symbol: self.symbol.map(str::to_string),
            stage: self.stage,
            outcome,
            detail,
        });
    }
}
