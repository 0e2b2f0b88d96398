//! Bar-series indicators computed by the aggregation step.

pub mod vwap;

pub use vwap::{cumulative_dollar_value, RollingVwap, ZeroVolumePolicy};

/// One-minute test bar at 2024-03-04 09:30 + `minute` (naive exchange time stored as UTC).
#[cfg(test)]
pub fn make_bar(minute: i64, high: f64, low: f64, close: f64, volume: u64) -> crate::domain::Bar {
    use chrono::TimeZone;
    let open = (high + low) / 2.0;
    crate::domain::Bar {
        timestamp: chrono::Utc.with_ymd_and_hms(2024, 3, 4, 9, 30, 0).unwrap()
            + chrono::Duration::minutes(minute),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Assert two f64 values agree to a relative tolerance.
#[cfg(test)]
pub fn assert_rel(actual: f64, expected: f64, tolerance: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance * scale,
        "assert_rel failed: actual={actual}, expected={expected}, tolerance={tolerance}"
    );
}
