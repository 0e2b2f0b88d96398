//! Property tests for the aggregation and merge invariants.
//!
//! Uses proptest to verify:
//! 1. Rolling VWAP equals a brute-force scan of the time window
//! 2. Cumulative dollar value is non-decreasing
//! 3. A merged series is ordered by (timestamp, symbol) and loses no rows

use barflow_core::data::frame::aggregated_to_frame;
use barflow_core::domain::{AggregatedBar, Bar, TimeSeries};
use barflow_core::indicators::{cumulative_dollar_value, RollingVwap, ZeroVolumePolicy};
use barflow_core::steps::merge::merge;
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

/// (gap in minutes, mid price, half spread, close position in range, volume)
fn arb_bar_step() -> impl Strategy<Value = (i64, f64, f64, f64, u64)> {
    (
        1i64..6,
        10.0..500.0_f64,
        0.0..5.0_f64,
        0.0..1.0_f64,
        prop_oneof![1 => Just(0u64), 4 => 1u64..10_000],
    )
}

fn arb_bars() -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec(arb_bar_step(), 0..150).prop_map(|steps| {
        let mut ts = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        steps
            .into_iter()
            .map(|(gap, mid, spread, pos, volume)| {
                ts += Duration::minutes(gap);
                let low = mid - spread;
                let high = mid + spread;
                Bar {
                    timestamp: ts,
                    open: mid,
                    high,
                    low,
                    close: low + pos * (high - low),
                    volume,
                }
            })
            .collect()
    })
}

fn arb_window() -> impl Strategy<Value = i64> {
    1i64..40
}

/// Direct definition: scan every bar in `[t - window, t]`.
fn brute_force_vwap(bars: &[Bar], window: Duration, policy: ZeroVolumePolicy) -> Vec<Option<f64>> {
    let mut last = None;
    bars.iter()
        .map(|bar| {
            let start = bar.timestamp - window;
            let in_window = bars
                .iter()
                .filter(|b| b.timestamp >= start && b.timestamp <= bar.timestamp);
            let (tpv, volume) = in_window.fold((0.0, 0u64), |(tpv, vol), b| {
                (tpv + b.typical_price() * b.volume as f64, vol + b.volume)
            });
            if volume == 0 {
                return match policy {
                    ZeroVolumePolicy::CarryForward => last,
                    ZeroVolumePolicy::Null => None,
                };
            }
            let vwap = tpv / volume as f64;
            last = Some(vwap);
            Some(vwap)
        })
        .collect()
}

/// Running sums subtract what leaves the window, so allow for cancellation error.
fn close_enough(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-7 * b.abs().max(1.0)
}

// ── 1. VWAP matches the definition ───────────────────────────────────

proptest! {
    #[test]
    fn rolling_vwap_matches_brute_force(
        bars in arb_bars(),
        minutes in arb_window(),
        carry in any::<bool>(),
    ) {
        let policy = if carry { ZeroVolumePolicy::CarryForward } else { ZeroVolumePolicy::Null };
        let window = Duration::minutes(minutes);
        let fast = RollingVwap::new(window, policy).compute(&bars);
        let slow = brute_force_vwap(&bars, window, policy);

        prop_assert_eq!(fast.len(), slow.len());
        for (i, (f, s)) in fast.iter().zip(&slow).enumerate() {
            match (f, s) {
                (Some(f), Some(s)) => {
                    prop_assert!(close_enough(*f, *s), "row {}: {} vs {}", i, f, s)
                }
                (None, None) => {}
                _ => prop_assert!(false, "row {}: defined-ness differs ({:?} vs {:?})", i, f, s),
            }
        }
    }

    /// Every defined VWAP lies within the lows and highs of its window.
    #[test]
    fn vwap_is_bounded_by_window_prices(bars in arb_bars()) {
        let vwap = RollingVwap::default().compute(&bars);
        for (i, value) in vwap.iter().enumerate() {
            if let Some(v) = value {
                let start = bars[i].timestamp - Duration::minutes(15);
                let window: Vec<&Bar> =
                    bars[..=i].iter().filter(|b| b.timestamp >= start).collect();
                let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
                let high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
                // Carry-forward may reach back past the window.
                let carried = window.iter().all(|b| b.volume == 0);
                if !carried {
                    prop_assert!(*v >= low - 1e-6 && *v <= high + 1e-6);
                }
            }
        }
    }
}

// ── 2. Dollar value monotone ─────────────────────────────────────────

proptest! {
    #[test]
    fn dollar_value_never_decreases(bars in arb_bars()) {
        let dv = cumulative_dollar_value(&bars);
        prop_assert_eq!(dv.len(), bars.len());
        for pair in dv.windows(2) {
            prop_assert!(pair[1] >= pair[0]);
        }
        if let Some(last) = dv.last() {
            let total: f64 = bars.iter().map(|b| b.close * b.volume as f64).sum();
            prop_assert!(close_enough(*last, total));
        }
    }
}

// ── 3. Merge ordering ────────────────────────────────────────────────

fn aggregated_series(symbol: &str, bars: Vec<Bar>) -> TimeSeries {
    let aggregated: Vec<AggregatedBar> = bars
        .into_iter()
        .map(|bar| AggregatedBar {
            dollar_value: bar.dollar_value(),
            vwap: Some(bar.typical_price()),
            bar,
        })
        .collect();
    let frame = aggregated_to_frame(symbol, &aggregated).unwrap();
    TimeSeries::for_symbol(symbol, frame).unwrap()
}

proptest! {
    #[test]
    fn merged_series_is_ordered_and_complete(a in arb_bars(), b in arb_bars()) {
        prop_assume!(!a.is_empty() || !b.is_empty());
        let rows = a.len() + b.len();
        // TimeSeries::merged re-checks (timestamp, symbol) order on construction.
        let branches = vec![aggregated_series("NFLX", a), aggregated_series("DIS", b)];
        let merged = merge(branches).unwrap();
        prop_assert_eq!(merged.len(), rows);
    }
}
