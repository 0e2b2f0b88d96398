//! In-memory provider with scripted per-symbol responses.
//!
//! Used for fixtures and tests: each symbol maps to a fixed list of bars or a
//! fixed error, optionally after a delay.

use super::provider::{DataProvider, DataSource, FetchError, FetchResult};
use crate::domain::{DateWindow, RawBar};
use crate::pipeline::CancellationToken;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Bars(Vec<RawBar>),
    Error(FetchError),
}

#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    responses: HashMap<String, Scripted>,
    delays: HashMap<String, Duration>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `symbol` with `bars`, filtered to the requested window.
    pub fn with_bars(mut self, symbol: &str, bars: Vec<RawBar>) -> Self {
        self.responses
            .insert(symbol.to_string(), Scripted::Bars(bars));
        self
    }

    /// Respond to `symbol` with `error`.
    pub fn with_error(mut self, symbol: &str, error: FetchError) -> Self {
        self.responses
            .insert(symbol.to_string(), Scripted::Error(error));
        self
    }

    /// Sleep before answering `symbol`, polling for cancellation.
    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }
}

impl DataProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(
        &self,
        symbol: &str,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        if let Some(delay) = self.delays.get(symbol) {
            let step = Duration::from_millis(5);
            let mut waited = Duration::ZERO;
            while waited < *delay {
                if cancel.is_cancelled() {
                    return Err(FetchError::Cancelled {
                        symbol: symbol.to_string(),
                    });
                }
                std::thread::sleep(step);
                waited += step;
            }
        }

        match self.responses.get(symbol) {
            Some(Scripted::Bars(bars)) => Ok(FetchResult {
                symbol: symbol.to_string(),
                bars: bars
                    .iter()
                    .filter(|b| window.contains(b.timestamp))
                    .cloned()
                    .collect(),
                source: DataSource::Memory,
            }),
            Some(Scripted::Error(e)) => Err(e.clone()),
            None => Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn bar(day: u32) -> RawBar {
        RawBar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 14, 30, 0).unwrap(),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.5,
            adj_close: 10.5,
            volume: 100,
        }
    }

    #[test]
    fn filters_bars_to_window() {
        let provider = MemoryProvider::new().with_bars("DIS", vec![bar(3), bar(4), bar(5)]);
        let window = DateWindow::single_day(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let result = provider
            .fetch("DIS", &window, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.bars, vec![bar(4)]);
    }

    #[test]
    fn unknown_symbol_is_not_found() {
        let window = DateWindow::single_day(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let result = MemoryProvider::new().fetch("ZZZ", &window, &CancellationToken::new());
        assert!(matches!(result, Err(FetchError::SymbolNotFound { .. })));
    }

    #[test]
    fn delay_observes_cancellation() {
        let provider = MemoryProvider::new()
            .with_bars("DIS", vec![])
            .with_delay("DIS", Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let window = DateWindow::single_day(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let result = provider.fetch("DIS", &window, &cancel);
        assert!(matches!(result, Err(FetchError::Cancelled { .. })));
    }
}
