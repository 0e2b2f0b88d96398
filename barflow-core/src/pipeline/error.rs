//! Errors a node can fail with.

use crate::data::provider::FetchError;
use crate::data::schema::SchemaError;
use thiserror::Error;

/// Every VWAP in a non-empty series came out undefined.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("vwap undefined for all {rows} rows of '{symbol}' (zero volume throughout)")]
pub struct UndefinedAggregateError {
    pub symbol: String,
    pub rows: usize,
}

/// The join step could not produce a merged series. Fatal to the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("no branch produced output")]
    NoBranches,

    #[error("all {branches} present branches are empty; no key can be derived")]
    NoRows { branches: usize },

    #[error("merged frame rejected: {0}")]
    Schema(#[from] SchemaError),
}

/// Union of the failures a pipeline node returns.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    UndefinedAggregate(#[from] UndefinedAggregateError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("input '{0}' was not supplied")]
    MissingInput(String),

    #[error("run cancelled")]
    Cancelled,
}
