//! Source node: fetch one symbol's raw bars from a provider.

use crate::data::frame::raw_bars_to_frame;
use crate::data::provider::{DataProvider, FetchError, FetchResult};
use crate::data::schema::BarSchema;
use crate::domain::{DateWindow, RawBar, Symbol, TimeSeries};
use crate::pipeline::{Node, NodeContext, NodeInputs, Stage, StepError};
use polars::prelude::Schema;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

pub struct FetchNode {
    name: String,
    symbol: Symbol,
    provider: Arc<dyn DataProvider>,
    window: DateWindow,
    timeout: Duration,
}

impl FetchNode {
    pub fn new(
        symbol: impl Into<Symbol>,
        provider: Arc<dyn DataProvider>,
        window: DateWindow,
        timeout: Duration,
    ) -> Self {
        let symbol = symbol.into();
        Self {
            name: format!("fetch[{symbol}]"),
            symbol,
            provider,
            window,
            timeout,
        }
    }

    /// Call the provider on a worker thread and give up after `timeout`.
    ///
    /// On timeout the worker's token is cancelled so a cooperative provider
    /// stops early; its eventual result is discarded.
    fn fetch_with_timeout(&self, ctx: &NodeContext<'_>) -> Result<FetchResult, FetchError> {
        let token = ctx.cancel_token().child();
        let (tx, rx) = mpsc::channel();

        let provider = Arc::clone(&self.provider);
        let symbol = self.symbol.clone();
        let window = self.window;
        let worker_token = token.clone();
        thread::Builder::new()
            .name(format!("fetch-{}", self.symbol))
            .spawn(move || {
                let _ = tx.send(provider.fetch(&symbol, &window, &worker_token));
            })
            .map_err(|e| FetchError::Other(format!("failed to spawn fetch worker: {e}")))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                warn!(symbol = %self.symbol, timeout = ?self.timeout, "provider call timed out");
                Err(FetchError::Timeout {
                    symbol: self.symbol.clone(),
                    timeout: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(FetchError::Other(format!(
                "fetch worker for '{}' exited without a result",
                self.symbol
            ))),
        }
    }
}

impl Node for FetchNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::Fetch
    }

    fn symbol(&self) -> Option<&str> {
        Some(&self.symbol)
    }

    fn output_schema(&self) -> Schema {
        BarSchema::raw()
    }

    fn run(&self, ctx: &NodeContext<'_>, _inputs: NodeInputs) -> Result<TimeSeries, StepError> {
        if ctx.is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let result = self.fetch_with_timeout(ctx)?;
        let (bars, duplicates) = order_bars(result.bars);

        let detail = format!(
            "{} bars from {} for {}",
            bars.len(),
            self.provider.name(),
            self.window
        );
        if duplicates > 0 {
            ctx.warning(format!("{detail}; dropped {duplicates} duplicate timestamps"));
        } else {
            ctx.ok(detail);
        }

        let frame = raw_bars_to_frame(&self.symbol, &bars)?;
        Ok(TimeSeries::for_symbol(self.symbol.clone(), frame)?)
    }
}

/// Sort ascending by timestamp and keep the first bar of each timestamp.
fn order_bars(mut bars: Vec<RawBar>) -> (Vec<RawBar>, usize) {
    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    bars.dedup_by_key(|b| b.timestamp);
    let dropped = before - bars.len();
    (bars, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::MemoryProvider;
    use crate::pipeline::{CancellationToken, Diagnostics, Outcome};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn bar(minute: u32, close: f64) -> RawBar {
        RawBar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, minute, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            adj_close: close,
            volume: 10,
        }
    }

    fn window() -> DateWindow {
        DateWindow::single_day(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
    }

    fn run(node: &FetchNode, diagnostics: &Diagnostics) -> Result<TimeSeries, StepError> {
        let cancel = CancellationToken::new();
        let ctx = NodeContext::new(node.symbol(), Stage::Fetch, diagnostics, &cancel);
        node.run(&ctx, NodeInputs::new())
    }

    #[test]
    fn sorts_and_dedupes_provider_output() {
        let provider = MemoryProvider::new()
            .with_bars("NFLX", vec![bar(32, 3.0), bar(30, 1.0), bar(30, 9.0)]);
        let node = FetchNode::new("NFLX", Arc::new(provider), window(), Duration::from_secs(5));
        let diagnostics = Diagnostics::new();

        let series = run(&node, &diagnostics).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.symbol(), Some("NFLX"));
        let records = diagnostics.for_symbol("NFLX");
        assert_eq!(records[0].outcome, Outcome::Warning);
        assert!(records[0].detail.contains("1 duplicate"));
    }

    #[test]
    fn empty_fetch_is_not_an_error() {
        let provider = MemoryProvider::new().with_bars("DIS", vec![]);
        let node = FetchNode::new("DIS", Arc::new(provider), window(), Duration::from_secs(5));
        let series = run(&node, &Diagnostics::new()).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn provider_error_is_a_fetch_error() {
        let provider = MemoryProvider::new()
            .with_error("DIS", FetchError::RateLimited { retry_after_secs: 60 });
        let node = FetchNode::new("DIS", Arc::new(provider), window(), Duration::from_secs(5));
        assert!(matches!(
            run(&node, &Diagnostics::new()),
            Err(StepError::Fetch(FetchError::RateLimited { .. }))
        ));
    }

    #[test]
    fn slow_provider_times_out() {
        let provider = MemoryProvider::new()
            .with_bars("DIS", vec![bar(30, 1.0)])
            .with_delay("DIS", Duration::from_secs(10));
        let node = FetchNode::new("DIS", Arc::new(provider), window(), Duration::from_millis(50));
        assert!(matches!(
            run(&node, &Diagnostics::new()),
            Err(StepError::Fetch(FetchError::Timeout { .. }))
        ));
    }
}
