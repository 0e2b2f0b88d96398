//! Bar records, one per pipeline stage.
//!
//! A bar moves through three shapes:
//! - [`RawBar`]: what the provider returns, including the adjusted close
//! - [`Bar`]: the cleaned bar, adjusted close dropped
//! - [`AggregatedBar`]: a cleaned bar plus rolling VWAP and cumulative dollar value
//!
//! The symbol lives on the owning [`TimeSeries`](super::TimeSeries), not on
//! each record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw one-minute OHLCV bar from a data provider (before cleaning).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

impl RawBar {
    /// Strip the provider-only columns.
    pub fn into_bar(self) -> Bar {
        Bar {
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }

    /// OHLC invariant check on the raw fields.
    pub fn is_sane(&self) -> bool {
        ohlc_is_sane(self.open, self.high, self.low, self.close)
    }
}

/// Cleaned OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// (high + low + close) / 3.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Traded dollar value of this bar, priced at the close.
    pub fn dollar_value(&self) -> f64 {
        self.close * self.volume as f64
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// high >= max(open, close, low) and low <= min(open, close, high).
    pub fn is_sane(&self) -> bool {
        ohlc_is_sane(self.open, self.high, self.low, self.close)
    }
}

/// Cleaned bar enriched with the aggregation outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedBar {
    pub bar: Bar,
    /// Rolling VWAP; `None` where the window volume was zero and no earlier
    /// value could be carried.
    pub vwap: Option<f64>,
    /// Cumulative close × volume from the first bar of the series.
    pub dollar_value: f64,
}

fn ohlc_is_sane(open: f64, high: f64, low: f64, close: f64) -> bool {
    if open.is_nan() || high.is_nan() || low.is_nan() || close.is_nan() {
        return false;
    }
    high >= low && high >= open && high >= close && low <= open && low <= close
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_raw() -> RawBar {
        RawBar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            adj_close: 102.5,
            volume: 50_000,
        }
    }

    #[test]
    fn raw_bar_is_sane() {
        assert!(sample_raw().is_sane());
    }

    #[test]
    fn into_bar_drops_adjusted_close() {
        let bar = sample_raw().into_bar();
        assert_eq!(bar.close, 103.0);
        assert_eq!(bar.volume, 50_000);
    }

    #[test]
    fn typical_price_is_hlc_mean() {
        let bar = sample_raw().into_bar();
        assert!((bar.typical_price() - (105.0 + 98.0 + 103.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_raw().into_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_raw().into_bar();
        bar.high = 97.0; // below low
        assert!(!bar.is_sane());
    }
}
