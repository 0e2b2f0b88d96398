//! Cleaning: drop the provider-only adjusted close column.

use crate::data::schema::{columns::ADJ_CLOSE, BarSchema, SchemaError};
use crate::domain::{Symbol, TimeSeries};
use crate::pipeline::{InputPort, Node, NodeContext, NodeInputs, Stage, StepError};
use polars::prelude::Schema;

pub struct CleanNode {
    name: String,
    symbol: Symbol,
}

impl CleanNode {
    pub const INPUT: &'static str = "series";

    pub fn new(symbol: impl Into<Symbol>) -> Self {
        let symbol = symbol.into();
        Self {
            name: format!("clean[{symbol}]"),
            symbol,
        }
    }
}

impl Node for CleanNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::Clean
    }

    fn symbol(&self) -> Option<&str> {
        Some(&self.symbol)
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![InputPort::one(Self::INPUT, BarSchema::raw())]
    }

    fn output_schema(&self) -> Schema {
        BarSchema::clean()
    }

    fn run(&self, ctx: &NodeContext<'_>, mut inputs: NodeInputs) -> Result<TimeSeries, StepError> {
        let series = inputs.take_one(Self::INPUT)?;
        let cleaned = clean(series)?;
        ctx.ok(format!("{} rows cleaned", cleaned.len()));
        Ok(cleaned)
    }
}

/// Drop `adj_close`. Row count and order are unchanged.
pub fn clean(series: TimeSeries) -> Result<TimeSeries, SchemaError> {
    if !series.frame().schema().contains(ADJ_CLOSE) {
        return Err(SchemaError::MissingColumn(ADJ_CLOSE.to_string()));
    }
    let symbol = series.symbol().map(str::to_string);
    let frame = series.into_frame().drop(ADJ_CLOSE)?;
    match symbol {
        Some(symbol) => TimeSeries::for_symbol(symbol, frame),
        None => TimeSeries::merged(frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::{bars_from_frame, raw_bars_to_frame};
    use crate::domain::RawBar;
    use chrono::{TimeZone, Utc};

    fn raw_series() -> TimeSeries {
        let bars: Vec<RawBar> = (30..33)
            .map(|minute| RawBar {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, minute, 0).unwrap(),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.5,
                adj_close: 10.4,
                volume: 100,
            })
            .collect();
        TimeSeries::for_symbol("DIS", raw_bars_to_frame("DIS", &bars).unwrap()).unwrap()
    }

    #[test]
    fn drops_adjusted_close_only() {
        let cleaned = clean(raw_series()).unwrap();
        assert_eq!(cleaned.len(), 3);
        assert!(!cleaned.frame().schema().contains(ADJ_CLOSE));
        BarSchema::validate(cleaned.frame(), &BarSchema::clean()).unwrap();
        assert_eq!(bars_from_frame(cleaned.frame()).unwrap()[2].close, 10.5);
    }

    #[test]
    fn cleaning_twice_is_a_schema_error() {
        let once = clean(raw_series()).unwrap();
        assert_eq!(
            clean(once).unwrap_err(),
            SchemaError::MissingColumn(ADJ_CLOSE.to_string())
        );
    }
}
