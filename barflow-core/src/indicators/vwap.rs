//! Rolling volume-weighted average price and cumulative dollar value.
//!
//! VWAP at bar t is Σ(typical_price × volume) / Σ(volume) over every bar whose
//! timestamp lies in `[t - window, t]`. The window is anchored to clock time,
//! not bar count, so gaps from missing minutes shrink the window instead of
//! stretching it.
//!
//! Volumes are integers, so the window volume is tracked exactly and a zero
//! window is detected without floating-point tolerance. What happens on a
//! zero window is decided by [`ZeroVolumePolicy`]. A window holding a
//! non-finite price is treated the same way until that bar leaves it.

use crate::domain::Bar;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What VWAP to report when the window holds no traded volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVolumePolicy {
    /// Reuse the most recent defined VWAP; null if there is none yet.
    #[default]
    CarryForward,
    /// Always null.
    Null,
}

/// Time-based trailing VWAP.
#[derive(Debug, Clone)]
pub struct RollingVwap {
    window: Duration,
    policy: ZeroVolumePolicy,
}

impl RollingVwap {
    pub fn new(window: Duration, policy: ZeroVolumePolicy) -> Self {
        assert!(window > Duration::zero(), "VWAP window must be positive");
        Self { window, policy }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn policy(&self) -> ZeroVolumePolicy {
        self.policy
    }

    /// Compute VWAP for every bar. `bars` must be sorted ascending by timestamp.
    ///
    /// Returns one entry per bar; `None` marks an undefined VWAP.
    pub fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        debug_assert!(
            bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
            "bars must be strictly ascending"
        );

        let window_ms = self.window.num_milliseconds();
        let mut window: VecDeque<(i64, f64, u64)> = VecDeque::new();
        let mut tpv_sum = 0.0_f64;
        let mut volume_sum: u64 = 0;
        // Non-finite contributions are kept out of `tpv_sum` and counted here.
        let mut non_finite = 0usize;
        let mut last_valid: Option<f64> = None;
        let mut result = Vec::with_capacity(bars.len());

        for bar in bars {
            let ts = bar.timestamp.timestamp_millis();
            let tpv = if bar.volume == 0 {
                0.0
            } else {
                bar.typical_price() * bar.volume as f64
            };
            window.push_back((ts, tpv, bar.volume));
            if tpv.is_finite() {
                tpv_sum += tpv;
            } else {
                non_finite += 1;
            }
            volume_sum += bar.volume;

            // Left edge is inclusive: a bar exactly `window` old stays.
            let cutoff = ts - window_ms;
            while let Some(&(front_ts, front_tpv, front_vol)) = window.front() {
                if front_ts >= cutoff {
                    break;
                }
                if front_tpv.is_finite() {
                    tpv_sum -= front_tpv;
                } else {
                    non_finite -= 1;
                }
                volume_sum -= front_vol;
                window.pop_front();
            }

            if volume_sum == 0 {
                // Drop accumulated rounding residue.
                tpv_sum = 0.0;
            }
            if volume_sum == 0 || non_finite > 0 {
                result.push(match self.policy {
                    ZeroVolumePolicy::CarryForward => last_valid,
                    ZeroVolumePolicy::Null => None,
                });
                continue;
            }

            let vwap = tpv_sum / volume_sum as f64;
            last_valid = Some(vwap);
            result.push(Some(vwap));
        }

        result
    }
}

impl Default for RollingVwap {
    /// Fifteen-minute window, carry-forward policy.
    fn default() -> Self {
        Self::new(Duration::minutes(15), ZeroVolumePolicy::default())
    }
}

/// Running Σ(close × volume) from the first bar.
///
/// Non-decreasing whenever closes are non-negative.
pub fn cumulative_dollar_value(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .scan(0.0_f64, |total, bar| {
            *total += bar.dollar_value();
            Some(*total)
        })
        .collect()
}
