//! Data provider trait and structured fetch errors.
//!
//! The DataProvider trait abstracts over minute-bar sources (Yahoo Finance,
//! synthetic, in-memory fixtures) so a run can swap implementations and tests
//! can script provider behaviour.

use crate::domain::{DateWindow, RawBar};
use crate::pipeline::CancellationToken;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Structured error types for provider fetches.
///
/// Every variant is fatal to the symbol's branch only.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("fetch for '{symbol}' timed out after {timeout:?}")]
    Timeout { symbol: String, timeout: Duration },

    #[error("fetch for '{symbol}' was cancelled")]
    Cancelled { symbol: String },

    #[error("fetch error: {0}")]
    Other(String),
}

/// Result of a successful fetch for a single symbol.
///
/// `bars` may be empty: a holiday or a day without trades is not an error.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub bars: Vec<RawBar>,
    pub source: DataSource,
}

/// Where the data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    YahooFinance,
    Synthetic,
    Memory,
}

/// Trait for minute-bar providers.
///
/// Implementations must be safe to call from several branch workers at once.
/// Long-running implementations should poll `cancel` between network calls
/// and return [`FetchError::Cancelled`] once it is set.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch one-minute bars for `symbol` whose timestamps fall in `window`.
    fn fetch(
        &self,
        symbol: &str,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError>;
}
