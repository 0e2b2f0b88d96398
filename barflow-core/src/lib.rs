//! barflow core: bar records, frame codecs, providers, sinks and the pipeline engine.
//!
//! This crate contains:
//! - Domain types (raw, cleaned and aggregated bars; time series; date windows)
//! - Declared frame schemas and record codecs on top of polars
//! - Data providers (Yahoo Finance, synthetic, in-memory) and file sinks
//! - The node/graph/executor engine with per-run diagnostics and cancellation
//! - The fetch, validate, clean, aggregate and merge steps
//! - Rolling VWAP and cumulative dollar value

pub mod data;
pub mod domain;
pub mod indicators;
pub mod pipeline;
pub mod plan;
pub mod steps;
