//! Join node: merge every present branch into one time-ordered series.

use crate::data::schema::{columns, BarSchema, SchemaError};
use crate::domain::TimeSeries;
use crate::pipeline::{
    FailurePolicy, InputPort, MergeError, Node, NodeContext, NodeInputs, Stage, StepError,
};
use polars::prelude::*;

pub struct MergeNode;

impl MergeNode {
    pub const INPUT: &'static str = "branches";
    pub const NAME: &'static str = "merge";
}

impl Node for MergeNode {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stage(&self) -> Stage {
        Stage::Merge
    }

    fn inputs(&self) -> Vec<InputPort> {
        vec![InputPort::many(Self::INPUT, BarSchema::aggregated())]
    }

    fn output_schema(&self) -> Schema {
        BarSchema::aggregated()
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }

    fn run(&self, ctx: &NodeContext<'_>, mut inputs: NodeInputs) -> Result<TimeSeries, StepError> {
        let slots = inputs.take_many(Self::INPUT)?;
        let total = slots.len();
        let present: Vec<TimeSeries> = slots.into_iter().flatten().collect();
        let absent = total - present.len();

        let merged = merge(present)?;
        let detail = format!(
            "{} rows from {} of {total} branches",
            merged.len(),
            total - absent
        );
        if absent > 0 {
            ctx.warning(format!("{detail}; {absent} absent"));
        } else {
            ctx.ok(detail);
        }
        Ok(merged)
    }
}

/// Concatenate branch outputs and stable-sort by (timestamp, symbol).
pub fn merge(branches: Vec<TimeSeries>) -> Result<TimeSeries, MergeError> {
    if branches.is_empty() {
        return Err(MergeError::NoBranches);
    }
    let count = branches.len();

    let frames: Vec<LazyFrame> = branches.into_iter().map(|s| s.into_frame().lazy()).collect();
    let df = concat(frames, UnionArgs::default())
        .and_then(|lf| {
            lf.sort(
                [columns::TIMESTAMP, columns::SYMBOL],
                SortMultipleOptions::default()
                    .with_order_descending_multi([false, false])
                    .with_maintain_order(true),
            )
            .collect()
        })
        .map_err(SchemaError::from)?;

    let merged = TimeSeries::merged(df)?;
    if merged.is_empty() {
        return Err(MergeError::NoRows { branches: count });
    }
    Ok(merged)
}

/// Sink key for a merged series: ISO date of its first row.
pub fn merge_key(series: &TimeSeries) -> Result<String, MergeError> {
    let date = series
        .first_date()?
        .ok_or(MergeError::NoRows { branches: 0 })?;
    Ok(date.format("%Y-%m-%d").to_string())
}
