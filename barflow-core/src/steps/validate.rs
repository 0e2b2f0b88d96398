//! Validation gate: emptiness and schema conformance, plus an anomaly scan.
//!
//! Rows are never dropped here. Bars that break the OHLC bounds or print
//! zero volume are counted and reported as a warning.

use crate::data::frame::raw_bars_from_frame;
use crate::data::schema::BarSchema;
use crate::domain::{Symbol, TimeSeries};
use crate::pipeline::{InputPort, Node, NodeContext, NodeInputs, Stage, StepError};
use polars::prelude::Schema;

pub struct ValidateNode {
    name: String,
    symbol: Symbol,
}

impl ValidateNode {
    pub const INPUT: &'static str = "series";

    pub fn new(symbol: impl Into<Symbol>) -> Self {
        let symbol = symbol.into();
        Self {
            name: format!("validate[{symbol}]"),
            symbol,
        }
    }
}

impl Node for ValidateNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::Validate
    }

    fn symbol(&self) -> Option<&str> {
        Some(&self.symbol)
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![InputPort::one(Self::INPUT, BarSchema::raw())]
    }

    fn output_schema(&self) -> Schema {
        BarSchema::raw()
    }

    fn run(&self, ctx: &NodeContext<'_>, mut inputs: NodeInputs) -> Result<TimeSeries, StepError> {
        let series = inputs.take_one(Self::INPUT)?;
        validate(ctx, series)
    }
}

/// Check `series` and pass it through unchanged.
pub fn validate(ctx: &NodeContext<'_>, series: TimeSeries) -> Result<TimeSeries, StepError> {
    // Schema first: an empty frame can still be missing columns.
    BarSchema::validate(series.frame(), &BarSchema::raw())?;
    if series.is_empty() {
        ctx.warning("no rows");
        return Ok(series);
    }

    let bars = raw_bars_from_frame(series.frame())?;

    let out_of_bounds = bars.iter().filter(|b| !b.is_sane()).count();
    let zero_volume = bars.iter().filter(|b| b.volume == 0).count();

    if out_of_bounds > 0 || zero_volume > 0 {
        ctx.warning(format!(
            "{} rows; {out_of_bounds} outside OHLC bounds, {zero_volume} with zero volume",
            bars.len()
        ));
    } else {
        ctx.ok(format!("{} rows", bars.len()));
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::{bars_to_frame, raw_bars_to_frame};
    use crate::data::schema::SchemaError;
    use crate::domain::RawBar;
    use crate::pipeline::{CancellationToken, Diagnostics, Outcome};
    use chrono::{TimeZone, Utc};

    fn raw(minute: u32, high: f64, low: f64, volume: u64) -> RawBar {
        RawBar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, minute, 0).unwrap(),
            open: 10.0,
            high,
            low,
            close: 10.0,
            adj_close: 10.0,
            volume,
        }
    }

    fn check(series: TimeSeries) -> (Result<TimeSeries, StepError>, Diagnostics) {
        let diagnostics = Diagnostics::new();
        let cancel = CancellationToken::new();
        let ctx = NodeContext::new(Some("NFLX"), Stage::Validate, &diagnostics, &cancel);
        let result = validate(&ctx, series);
        (result, diagnostics)
    }

    #[test]
    fn empty_series_warns_and_passes_through() {
        let frame = raw_bars_to_frame("NFLX", &[]).unwrap();
        let input = TimeSeries::for_symbol("NFLX", frame).unwrap();
        let (result, diagnostics) = check(input.clone());

        let output = result.unwrap();
        assert!(output.frame().equals(input.frame()));
        let records = diagnostics.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, Outcome::Warning);
        assert_eq!(records[0].detail, "no rows");
    }

    #[test]
    fn clean_bars_report_ok() {
        let frame = raw_bars_to_frame("NFLX", &[raw(30, 11.0, 9.0, 100)]).unwrap();
        let (result, diagnostics) = check(TimeSeries::for_symbol("NFLX", frame).unwrap());
        assert_eq!(result.unwrap().len(), 1);
        assert_eq!(diagnostics.snapshot()[0].outcome, Outcome::Ok);
    }

    #[test]
    fn anomalies_are_counted_not_dropped() {
        let bars = vec![raw(30, 11.0, 9.0, 100), raw(31, 9.0, 11.0, 100), raw(32, 11.0, 9.0, 0)];
        let frame = raw_bars_to_frame("NFLX", &bars).unwrap();
        let (result, diagnostics) = check(TimeSeries::for_symbol("NFLX", frame).unwrap());

        assert_eq!(result.unwrap().len(), 3);
        let record = &diagnostics.snapshot()[0];
        assert_eq!(record.outcome, Outcome::Warning);
        assert!(record.detail.contains("1 outside OHLC bounds"));
        assert!(record.detail.contains("1 with zero volume"));
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let bars = vec![raw(30, 11.0, 9.0, 100).into_bar()];
        let frame = bars_to_frame("NFLX", &bars).unwrap();
        let (result, _) = check(TimeSeries::for_symbol("NFLX", frame).unwrap());
        assert!(matches!(
            result,
            Err(StepError::Schema(SchemaError::MissingColumn(c))) if c == "adj_close"
        ));
    }

    #[test]
    fn empty_frame_missing_a_column_is_a_schema_error() {
        let frame = raw_bars_to_frame("NFLX", &[]).unwrap().drop("volume").unwrap();
        let (result, diagnostics) = check(TimeSeries::for_symbol("NFLX", frame).unwrap());
        assert!(matches!(
            result,
            Err(StepError::Schema(SchemaError::MissingColumn(c))) if c == "volume"
        ));
        assert!(diagnostics.snapshot().is_empty());
    }
}
