//! Synthetic minute-bar provider for offline development.
//!
//! Produces a deterministic random walk over the regular US session
//! (14:30–21:00 UTC) for every weekday in the window. The seed is derived from
//! the symbol and the day, so the same request always yields the same bars.
//! About 2% of minutes are missing and about 2% print with zero volume, which
//! keeps the gap and zero-volume paths of the aggregation step exercised.

use super::provider::{DataProvider, DataSource, FetchError, FetchResult};
use crate::domain::{DateWindow, RawBar};
use crate::pipeline::CancellationToken;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SESSION_OPEN: (u32, u32) = (14, 30);
const SESSION_MINUTES: i64 = 390;

#[derive(Debug, Clone, Default)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        window: &DateWindow,
        cancel: &CancellationToken,
    ) -> Result<FetchResult, FetchError> {
        let mut bars = Vec::new();
        for day in window.days() {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled {
                    symbol: symbol.to_string(),
                });
            }
            bars.extend(generate_session(symbol, day));
        }
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::Synthetic,
        })
    }
}

/// Generate one session of minute bars. Weekends yield no bars.
pub fn generate_session(symbol: &str, day: NaiveDate) -> Vec<RawBar> {
    if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        return Vec::new();
    }

    let seed_input = format!("{symbol}:{day}");
    let seed: [u8; 32] = *blake3::hash(seed_input.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let Some(open_time) = NaiveTime::from_hms_opt(SESSION_OPEN.0, SESSION_OPEN.1, 0) else {
        return Vec::new();
    };
    let session_open = day.and_time(open_time).and_utc();

    let mut price = rng.gen_range(20.0..500.0_f64);
    let mut bars = Vec::with_capacity(SESSION_MINUTES as usize);

    for minute in 0..SESSION_MINUTES {
        let step: f64 = rng.gen_range(-0.002..0.002);
        let open = price;
        let close = price * (1.0 + step);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.001));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.001));
        price = close;

        let roll: f64 = rng.gen();
        if roll < 0.02 {
            continue;
        }
        let volume = if roll < 0.04 {
            0
        } else {
            rng.gen_range(100..50_000u64)
        };

        bars.push(RawBar {
            timestamp: session_open + Duration::minutes(minute),
            open,
            high,
            low,
            close,
            adj_close: close,
            volume,
        });
    }

    bars
}
