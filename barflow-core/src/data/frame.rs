//! Codecs between typed bar records and polars frames.
//!
//! Encoding always produces the declared schema of the stage
//! ([`BarSchema`](super::schema::BarSchema)); decoding checks it first, so a
//! frame that decodes is a frame that conforms.

use super::schema::{columns::*, timestamp_dtype, BarSchema, SchemaError};
use crate::domain::series::timestamp_millis;
use crate::domain::{AggregatedBar, Bar, RawBar};
use chrono::{DateTime, Utc};
use polars::prelude::*;

/// Encode raw provider bars for one symbol.
pub fn raw_bars_to_frame(symbol: &str, bars: &[RawBar]) -> Result<DataFrame, SchemaError> {
    let df = DataFrame::new(vec![
        timestamp_column(bars.iter().map(|b| b.timestamp))?,
        Column::new(SYMBOL.into(), vec![symbol; bars.len()]),
        Column::new(OPEN.into(), bars.iter().map(|b| b.open).collect::<Vec<f64>>()),
        Column::new(HIGH.into(), bars.iter().map(|b| b.high).collect::<Vec<f64>>()),
        Column::new(LOW.into(), bars.iter().map(|b| b.low).collect::<Vec<f64>>()),
        Column::new(CLOSE.into(), bars.iter().map(|b| b.close).collect::<Vec<f64>>()),
        Column::new(ADJ_CLOSE.into(), bars.iter().map(|b| b.adj_close).collect::<Vec<f64>>()),
        Column::new(VOLUME.into(), bars.iter().map(|b| b.volume).collect::<Vec<u64>>()),
    ])?;
    Ok(df)
}

/// Encode cleaned bars for one symbol.
pub fn bars_to_frame(symbol: &str, bars: &[Bar]) -> Result<DataFrame, SchemaError> {
    let df = DataFrame::new(vec![
        timestamp_column(bars.iter().map(|b| b.timestamp))?,
        Column::new(SYMBOL.into(), vec![symbol; bars.len()]),
        Column::new(OPEN.into(), bars.iter().map(|b| b.open).collect::<Vec<f64>>()),
        Column::new(HIGH.into(), bars.iter().map(|b| b.high).collect::<Vec<f64>>()),
        Column::new(LOW.into(), bars.iter().map(|b| b.low).collect::<Vec<f64>>()),
        Column::new(CLOSE.into(), bars.iter().map(|b| b.close).collect::<Vec<f64>>()),
        Column::new(VOLUME.into(), bars.iter().map(|b| b.volume).collect::<Vec<u64>>()),
    ])?;
    Ok(df)
}

/// Encode aggregated bars for one symbol. Undefined VWAP values become nulls.
pub fn aggregated_to_frame(symbol: &str, bars: &[AggregatedBar]) -> Result<DataFrame, SchemaError> {
    let mut df = bars_to_frame(
        symbol,
        &bars.iter().map(|a| a.bar.clone()).collect::<Vec<_>>(),
    )?;
    df.with_column(Column::new(
        VWAP.into(),
        bars.iter().map(|a| a.vwap).collect::<Vec<Option<f64>>>(),
    ))?;
    df.with_column(Column::new(
        DOLLAR_VALUE.into(),
        bars.iter().map(|a| a.dollar_value).collect::<Vec<f64>>(),
    ))?;
    Ok(df)
}

/// Decode a frame that conforms to [`BarSchema::raw`].
pub fn raw_bars_from_frame(df: &DataFrame) -> Result<Vec<RawBar>, SchemaError> {
    BarSchema::validate(df, &BarSchema::raw())?;
    let bars = bars_from_frame(df)?;
    let adj_close = required_f64(df, ADJ_CLOSE)?;

    Ok(bars
        .into_iter()
        .zip(adj_close)
        .map(|(b, adj_close)| RawBar {
            timestamp: b.timestamp,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            adj_close,
            volume: b.volume,
        })
        .collect())
}

/// Decode a frame that conforms to [`BarSchema::clean`].
pub fn bars_from_frame(df: &DataFrame) -> Result<Vec<Bar>, SchemaError> {
    BarSchema::validate(df, &BarSchema::clean())?;

    let timestamps = timestamp_millis(df)?;
    let opens = required_f64(df, OPEN)?;
    let highs = required_f64(df, HIGH)?;
    let lows = required_f64(df, LOW)?;
    let closes = required_f64(df, CLOSE)?;
    let volumes = required_u64(df, VOLUME)?;

    let mut bars = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(timestamps[i]).ok_or_else(|| {
            SchemaError::Frame(format!("timestamp out of range at row {i}: {}", timestamps[i]))
        })?;
        bars.push(Bar {
            timestamp,
            open: opens[i],
            high: highs[i],
            low: lows[i],
            close: closes[i],
            volume: volumes[i],
        });
    }
    Ok(bars)
}

/// Decode a frame that conforms to [`BarSchema::aggregated`].
pub fn aggregated_from_frame(df: &DataFrame) -> Result<Vec<AggregatedBar>, SchemaError> {
    BarSchema::validate(df, &BarSchema::aggregated())?;

    let bars = bars_from_frame(df)?;
    let vwap_col = df.column(VWAP)?;
    let vwaps = vwap_col.f64()?;
    let dollar_values = required_f64(df, DOLLAR_VALUE)?;

    Ok(bars
        .into_iter()
        .zip(vwaps.into_iter())
        .zip(dollar_values)
        .map(|((bar, vwap), dollar_value)| AggregatedBar {
            bar,
            vwap,
            dollar_value,
        })
        .collect())
}

fn timestamp_column(
    timestamps: impl Iterator<Item = DateTime<Utc>>,
) -> Result<Column, SchemaError> {
    let millis: Vec<i64> = timestamps.map(|ts| ts.timestamp_millis()).collect();
    Ok(Column::new(TIMESTAMP.into(), millis).cast(&timestamp_dtype())?)
}

fn required_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>, SchemaError> {
    let column = df.column(name)?;
    column
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| SchemaError::NullValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

fn required_u64(df: &DataFrame, name: &str) -> Result<Vec<u64>, SchemaError> {
    let column = df.column(name)?;
    column
        .u64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| SchemaError::NullValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(minute: u32, close: f64, volume: u64) -> RawBar {
        RawBar {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 4, 14, minute, 0).unwrap(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            adj_close: close * 0.99,
            volume,
        }
    }

    #[test]
    fn raw_frame_matches_declared_schema() {
        let df = raw_bars_to_frame("NFLX", &[raw(30, 600.0, 100), raw(31, 601.0, 200)]).unwrap();
        assert!(BarSchema::validate(&df, &BarSchema::raw()).is_ok());
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn empty_raw_frame_still_carries_schema() {
        let df = raw_bars_to_frame("NFLX", &[]).unwrap();
        assert_eq!(df.height(), 0);
        assert!(BarSchema::validate(&df, &BarSchema::raw()).is_ok());
    }

    #[test]
    fn decoding_raw_frame_as_clean_ignores_adjusted_close() {
        let df = raw_bars_to_frame("NFLX", &[raw(30, 600.0, 100)]).unwrap();
        let bars = bars_from_frame(&df).unwrap();
        assert_eq!(bars[0].close, 600.0);
        assert_eq!(bars[0].volume, 100);
    }

    #[test]
    fn aggregated_frame_keeps_null_vwap() {
        let bars = vec![
            AggregatedBar {
                bar: raw(30, 600.0, 0).into_bar(),
                vwap: None,
                dollar_value: 0.0,
            },
            AggregatedBar {
                bar: raw(31, 601.0, 10).into_bar(),
                vwap: Some(601.0),
                dollar_value: 6010.0,
            },
        ];
        let df = aggregated_to_frame("NFLX", &bars).unwrap();
        assert!(BarSchema::validate(&df, &BarSchema::aggregated()).is_ok());
        assert_eq!(df.column(VWAP).unwrap().null_count(), 1);

        let decoded = aggregated_from_frame(&df).unwrap();
        assert_eq!(decoded, bars);
    }

    #[test]
    fn decoding_rejects_null_prices() {
        let mut df = raw_bars_to_frame("NFLX", &[raw(30, 600.0, 100)]).unwrap();
        df.with_column(Column::new(CLOSE.into(), vec![None::<f64>]))
            .unwrap();
        let result = bars_from_frame(&df);
        assert!(matches!(result, Err(SchemaError::NullValue { .. })));
    }
}
