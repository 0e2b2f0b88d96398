//! Aggregation: rolling VWAP and cumulative dollar value per bar.

use crate::data::frame::{aggregated_to_frame, bars_from_frame};
use crate::data::schema::BarSchema;
use crate::domain::{AggregatedBar, Symbol, TimeSeries};
use crate::indicators::{cumulative_dollar_value, RollingVwap};
use crate::pipeline::{
    InputPort, Node, NodeContext, NodeInputs, Stage, StepError, UndefinedAggregateError,
};
use polars::prelude::Schema;

pub struct AggregateNode {
    name: String,
    symbol: Symbol,
    vwap: RollingVwap,
}

impl AggregateNode {
    pub const INPUT: &'static str = "series";

    pub fn new(symbol: impl Into<Symbol>, vwap: RollingVwap) -> Self {
        let symbol = symbol.into();
        Self {
            name: format!("aggregate[{symbol}]"),
            symbol,
            vwap,
        }
    }
}

impl Node for AggregateNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::Aggregate
    }

    fn symbol(&self) -> Option<&str> {
        Some(&self.symbol)
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![InputPort::one(Self::INPUT, BarSchema::clean())]
    }

    fn output_schema(&self) -> Schema {
        BarSchema::aggregated()
    }

    fn run(&self, ctx: &NodeContext<'_>, mut inputs: NodeInputs) -> Result<TimeSeries, StepError> {
        let series = inputs.take_one(Self::INPUT)?;
        let bars = aggregate(&self.symbol, &series, &self.vwap)?;

        let undefined = bars.iter().filter(|b| b.vwap.is_none()).count();
        if undefined > 0 {
            ctx.warning(format!("{} rows; {undefined} without vwap", bars.len()));
        } else {
            ctx.ok(format!("{} rows aggregated", bars.len()));
        }

        let frame = aggregated_to_frame(&self.symbol, &bars)?;
        Ok(TimeSeries::for_symbol(self.symbol.clone(), frame)?)
    }
}

/// Enrich every bar of a cleaned series.
///
/// Fails when the series has rows but no bar ends up with a defined VWAP.
pub fn aggregate(
    symbol: &str,
    series: &TimeSeries,
    vwap: &RollingVwap,
) -> Result<Vec<AggregatedBar>, StepError> {
    let bars = bars_from_frame(series.frame())?;
    let vwaps = vwap.compute(&bars);
    if !bars.is_empty() && vwaps.iter().all(Option::is_none) {
        return Err(UndefinedAggregateError {
            symbol: symbol.to_string(),
            rows: bars.len(),
        }
        .into());
    }
    let dollar_values = cumulative_dollar_value(&bars);

    Ok(bars
        .into_iter()
        .zip(vwaps)
        .zip(dollar_values)
        .map(|((bar, vwap), dollar_value)| AggregatedBar {
            bar,
            vwap,
            dollar_value,
        })
        .collect())
}
