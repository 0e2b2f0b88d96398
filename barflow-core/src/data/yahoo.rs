//! Yahoo Finance data provider.
//!
//! Fetches one-minute OHLCV bars from Yahoo's v8 chart API. Handles retries
//! with exponential backoff, response parsing and cancellation between
//! attempts.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; parsing failures surface as `ResponseFormatChanged`.

use super::provider::{DataProvider, DataSource, FetchError, FetchResult};
use crate::domain::{DateWindow, RawBar};
use crate::pipeline::CancellationToken;
use chrono::DateTime;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance one-minute bar provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    fetch_budget: Duration,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    /// `fetch_budget` bounds one whole fetch; each attempt gets an equal share.
    pub fn new(fetch_budget: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            fetch_budget,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    /// Override the retry budget.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Timeout for a single HTTP attempt: the budget left after every
    /// backoff sleep, split evenly across attempts.
    pub fn attempt_timeout(&self) -> Duration {
        let backoff_total = self.base_delay * (2u32.saturating_pow(self.max_retries) - 1);
        let available = self
            .fetch_budget
            .checked_sub(backoff_total)
            .filter(|d| !d.is_zero())
            .unwrap_or(self.fetch_budget);
        available / (self.max_retries + 1)
    }

    /// Build the chart API URL for a symbol and window.
    fn chart_url(symbol: &str, window: &DateWindow) -> String {
        let start_ts = window.start_utc().timestamp();
        let end_ts = window.end_utc().timestamp();
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1m\
             &includeAdjustedClose=true"
        )
    }

    /// Parse the chart API response into RawBars inside `window`.
    ///
    /// A result without timestamps is a day without trades and yields no bars.
    fn parse_response(
        symbol: &str,
        window: &DateWindow,
        resp: ChartResponse,
    ) -> Result<Vec<RawBar>, FetchError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    FetchError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    FetchError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                FetchError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormatChanged("result array is empty".into()))?;

        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                FetchError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;
            if !window.contains(timestamp) {
                continue;
            }

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();

            // Yahoo pads minutes without prints with nulls.
            let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
                continue;
            };
            let adj_close = adj_closes
                .as_ref()
                .and_then(|v| v.get(i).copied().flatten())
                .unwrap_or(close);

            bars.push(RawBar {
                timestamp,
                open,
                high,
                low,
                close,
                adj_close,
                volume: volume.unwrap_or(0),
            });
        }

        Ok(bars)
    }

    /// Sleep for `delay`, waking early if the run is cancelled.
    fn backoff(delay: Duration, cancel: &CancellationToken) -> bool {
        let step = Duration::from_millis(50);
        let mut slept = Duration::ZERO;
        while slept < delay {
            if cancel.is_cancelled() {
                return false;
            }
            std::thread::sleep(step.min(delay - slept));
            slept += step;
        }
        !cancel.is_cancelled()
    }

    /// Execute the request with retries.
    fn fetch_with_retry(
        &self,
        symbol: &str,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawBar>, FetchError> {
        let url = Self::chart_url(symbol, window);
        let cancelled = || FetchError::Cancelled {
            symbol: symbol.to_string(),
        };
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, ?delay, "retrying yahoo fetch");
                if !Self::backoff(delay, cancel) {
                    return Err(cancelled());
                }
            }
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            match self.client.get(&url).timeout(self.attempt_timeout()).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        warn!(symbol, retry_after, "rate limited by yahoo");
                        last_error = Some(FetchError::RateLimited {
                            retry_after_secs: retry_after,
                        });
                        continue;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(FetchError::AuthenticationRequired(format!(
                            "Yahoo Finance refused the request (HTTP {status})"
                        )));
                    }

                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(FetchError::SymbolNotFound {
                            symbol: symbol.to_string(),
                        });
                    }

                    if !status.is_success() {
                        last_error = Some(FetchError::Other(format!("HTTP {status} for {symbol}")));
                        continue;
                    }

                    let chart: ChartResponse = resp.json().map_err(|e| {
                        FetchError::ResponseFormatChanged(format!(
                            "failed to parse response for {symbol}: {e}"
                        ))
                    })?;

                    return Self::parse_response(symbol, window, chart);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(FetchError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(FetchError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Other("max retries exceeded".into())))
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let bars = self.fetch_with_retry(symbol, window, cancel)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::YahooFinance,
        })
    }
}
