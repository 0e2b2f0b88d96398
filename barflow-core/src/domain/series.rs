//! TimeSeries: the value that flows along every graph edge.
//!
//! A series wraps a polars frame plus its scope. Ordering invariants are
//! checked once, at construction, so downstream steps can rely on them:
//! - `Symbol` scope: one symbol, timestamps strictly ascending
//! - `Merged` scope: any number of symbols, ascending by (timestamp, symbol)

use super::Symbol;
use crate::data::schema::{columns, SchemaError};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;

/// What a series covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesScope {
    Symbol(Symbol),
    Merged { symbols: Vec<Symbol> },
}

/// An ordered frame of bars.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    scope: SeriesScope,
    frame: DataFrame,
}

impl TimeSeries {
    /// Wrap a single-symbol frame, checking that timestamps are strictly
    /// ascending and that every row belongs to `symbol`.
    pub fn for_symbol(symbol: impl Into<Symbol>, frame: DataFrame) -> Result<Self, SchemaError> {
        let symbol = symbol.into();
        let timestamps = timestamp_millis(&frame)?;
        for (row, pair) in timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SchemaError::Unordered {
                    row: row + 1,
                    detail: format!("{} follows {}", pair[1], pair[0]),
                });
            }
        }
        if frame.schema().contains(columns::SYMBOL) {
            let foreign = symbol_values(&frame)?.into_iter().find(|s| *s != symbol);
            if let Some(found) = foreign {
                return Err(SchemaError::ForeignSymbol {
                    expected: symbol,
                    found,
                });
            }
        }
        Ok(Self {
            scope: SeriesScope::Symbol(symbol),
            frame,
        })
    }

    /// Wrap a merged multi-symbol frame, checking (timestamp, symbol) order.
    pub fn merged(frame: DataFrame) -> Result<Self, SchemaError> {
        let timestamps = timestamp_millis(&frame)?;
        let symbols = symbol_values(&frame)?;
        for row in 1..timestamps.len() {
            let prev = (timestamps[row - 1], &symbols[row - 1]);
            let next = (timestamps[row], &symbols[row]);
            if next < prev {
                return Err(SchemaError::Unordered {
                    row,
                    detail: format!("({}, {}) follows ({}, {})", next.0, next.1, prev.0, prev.1),
                });
            }
        }
        let mut distinct = symbols;
        distinct.sort();
        distinct.dedup();
        Ok(Self {
            scope: SeriesScope::Merged { symbols: distinct },
            frame,
        })
    }

    pub fn scope(&self) -> &SeriesScope {
        &self.scope
    }

    /// The symbol of a single-symbol series.
    pub fn symbol(&self) -> Option<&str> {
        match &self.scope {
            SeriesScope::Symbol(s) => Some(s),
            SeriesScope::Merged { .. } => None,
        }
    }

    /// Symbols covered by this series.
    pub fn symbols(&self) -> Vec<&str> {
        match &self.scope {
            SeriesScope::Symbol(s) => vec![s.as_str()],
            SeriesScope::Merged { symbols } => symbols.iter().map(|s| s.as_str()).collect(),
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Timestamp of the first row, if any.
    pub fn first_timestamp(&self) -> Result<Option<DateTime<Utc>>, SchemaError> {
        let first = timestamp_millis(&self.frame.head(Some(1)))?;
        Ok(first
            .first()
            .and_then(|ms| DateTime::from_timestamp_millis(*ms)))
    }

    /// UTC calendar date of the first row, if any.
    pub fn first_date(&self) -> Result<Option<NaiveDate>, SchemaError> {
        Ok(self.first_timestamp()?.map(|ts| ts.date_naive()))
    }
}

/// Read the timestamp column as epoch milliseconds. Nulls are rejected.
pub fn timestamp_millis(frame: &DataFrame) -> Result<Vec<i64>, SchemaError> {
    let column = frame
        .column(columns::TIMESTAMP)
        .map_err(|_| SchemaError::MissingColumn(columns::TIMESTAMP.to_string()))?;
    let physical = column.cast(&DataType::Int64)?;
    let values = physical.i64()?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| SchemaError::NullValue {
                column: columns::TIMESTAMP.to_string(),
                row,
            })
        })
        .collect()
}

fn symbol_values(frame: &DataFrame) -> Result<Vec<String>, SchemaError> {
    let column = frame
        .column(columns::SYMBOL)
        .map_err(|_| SchemaError::MissingColumn(columns::SYMBOL.to_string()))?;
    let values = column.str()?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string).ok_or_else(|| SchemaError::NullValue {
                column: columns::SYMBOL.to_string(),
                row,
            })
        })
        .collect()
}
