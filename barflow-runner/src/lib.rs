//! barflow runner: run configuration and orchestration.
//!
//! This crate builds on `barflow-core` to provide:
//! - TOML run configuration with defaults and validation
//! - Graph assembly for a configured symbol set and window
//! - Run execution with the configured provider and sink
//! - Per-symbol branch outcomes for reporting and manual retry

pub mod config;
pub mod runner;

pub use config::{
    AggregationConfig, ConfigError, ExecutionConfig, OutputConfig, ProviderKind, RunConfig,
};
pub use runner::{
    branch_outcomes, build_provider, plan_run, run, run_with, BranchOutcome, RunError, RunSummary,
};
