//! Declared frame schemas for each pipeline stage.
//!
//! Every node declares the columns it needs and the columns it produces using
//! these schemas. The graph builder compares them when wiring edges, and the
//! validation step checks live frames against them.

use polars::prelude::*;

/// Column names shared by every stage.
pub mod columns {
    pub const TIMESTAMP: &str = "timestamp";
    pub const SYMBOL: &str = "symbol";
    pub const OPEN: &str = "open";
    pub const HIGH: &str = "high";
    pub const LOW: &str = "low";
    pub const CLOSE: &str = "close";
    pub const ADJ_CLOSE: &str = "adj_close";
    pub const VOLUME: &str = "volume";
    pub const VWAP: &str = "vwap";
    pub const DOLLAR_VALUE: &str = "dollar_value";
}

use columns::*;

/// Timestamp dtype used by every frame: epoch milliseconds, UTC, no tz tag.
pub fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Expected schema for bar frames at each stage.
pub struct BarSchema;

impl BarSchema {
    /// Provider payload: OHLC, adjusted close and volume.
    pub fn raw() -> Schema {
        Schema::from_iter(vec![
            Field::new(TIMESTAMP.into(), timestamp_dtype()),
            Field::new(SYMBOL.into(), DataType::String),
            Field::new(OPEN.into(), DataType::Float64),
            Field::new(HIGH.into(), DataType::Float64),
            Field::new(LOW.into(), DataType::Float64),
            Field::new(CLOSE.into(), DataType::Float64),
            Field::new(ADJ_CLOSE.into(), DataType::Float64),
            Field::new(VOLUME.into(), DataType::UInt64),
        ])
    }

    /// Cleaned bars: the raw schema without the adjusted close.
    pub fn clean() -> Schema {
        Schema::from_iter(vec![
            Field::new(TIMESTAMP.into(), timestamp_dtype()),
            Field::new(SYMBOL.into(), DataType::String),
            Field::new(OPEN.into(), DataType::Float64),
            Field::new(HIGH.into(), DataType::Float64),
            Field::new(LOW.into(), DataType::Float64),
            Field::new(CLOSE.into(), DataType::Float64),
            Field::new(VOLUME.into(), DataType::UInt64),
        ])
    }

    /// Aggregated bars: cleaned bars plus rolling VWAP and cumulative dollar value.
    pub fn aggregated() -> Schema {
        let mut schema = Self::clean();
        schema.with_column(VWAP.into(), DataType::Float64);
        schema.with_column(DOLLAR_VALUE.into(), DataType::Float64);
        schema
    }

    /// Validate a DataFrame against an expected schema.
    ///
    /// Extra columns are allowed; missing or mistyped ones are not.
    pub fn validate(df: &DataFrame, expected: &Schema) -> Result<(), SchemaError> {
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        Ok(())
    }

    /// Columns of `required` that `provided` lacks or carries with another dtype.
    ///
    /// Empty result means `provided` is a superset of `required`.
    pub fn incompatible_columns(provided: &Schema, required: &Schema) -> Vec<String> {
        required
            .iter_fields()
            .filter(|field| provided.get(field.name()) != Some(field.dtype()))
            .map(|field| field.name().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("null value in column {column} at row {row}")]
    NullValue { column: String, row: usize },

    #[error("timestamps out of order at row {row}: {detail}")]
    Unordered { row: usize, detail: String },

    #[error("series for '{expected}' contains rows for '{found}'")]
    ForeignSymbol { expected: String, found: String },

    #[error("frame error: {0}")]
    Frame(String),
}

impl From<PolarsError> for SchemaError {
    fn from(e: PolarsError) -> Self {
        SchemaError::Frame(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        let timestamp = Series::new(TIMESTAMP.into(), &[1_709_562_600_000i64])
            .cast(&timestamp_dtype())
            .unwrap();

        DataFrame::new(vec![
            Column::Series(timestamp.into()),
            Column::Series(Series::new(SYMBOL.into(), &["NFLX"]).into()),
            Column::Series(Series::new(OPEN.into(), &[600.0]).into()),
            Column::Series(Series::new(HIGH.into(), &[605.0]).into()),
            Column::Series(Series::new(LOW.into(), &[599.0]).into()),
            Column::Series(Series::new(CLOSE.into(), &[603.0]).into()),
            Column::Series(Series::new(ADJ_CLOSE.into(), &[603.0]).into()),
            Column::Series(Series::new(VOLUME.into(), &[1200u64]).into()),
        ])
        .unwrap()
    }

    #[test]
    fn clean_schema_is_raw_without_adjusted_close() {
        let raw = BarSchema::raw();
        let clean = BarSchema::clean();
        assert!(raw.contains(ADJ_CLOSE));
        assert!(!clean.contains(ADJ_CLOSE));
        assert_eq!(raw.len(), clean.len() + 1);
    }

    #[test]
    fn aggregated_schema_extends_clean() {
        let aggregated = BarSchema::aggregated();
        assert!(BarSchema::incompatible_columns(&aggregated, &BarSchema::clean()).is_empty());
        assert!(aggregated.contains(VWAP));
        assert!(aggregated.contains(DOLLAR_VALUE));
    }

    #[test]
    fn validate_accepts_raw_frame() {
        assert!(BarSchema::validate(&raw_frame(), &BarSchema::raw()).is_ok());
    }

    #[test]
    fn validate_rejects_missing_column() {
        let df = raw_frame().drop(VOLUME).unwrap();
        let result = BarSchema::validate(&df, &BarSchema::raw());
        assert_eq!(result, Err(SchemaError::MissingColumn(VOLUME.to_string())));
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let mut df = raw_frame();
        df.with_column(Series::new(OPEN.into(), &["not_a_number"]))
            .unwrap();
        let result = BarSchema::validate(&df, &BarSchema::raw());
        assert!(matches!(result, Err(SchemaError::TypeMismatch { .. })));
    }

    #[test]
    fn incompatible_columns_lists_what_is_missing() {
        let missing = BarSchema::incompatible_columns(&BarSchema::clean(), &BarSchema::raw());
        assert_eq!(missing, vec![ADJ_CLOSE.to_string()]);
    }
}
