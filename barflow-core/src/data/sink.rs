//! Sinks for the merged dataset.
//!
//! Layout: `{dir}/{key}.{ext}` where `key` is the ISO date of the first row.
//!
//! Both file sinks write atomically (write to `.tmp`, rename into place), so a
//! failed run never leaves a half-written file under the final name. The
//! Parquet sink also writes a `{key}.meta.json` sidecar.

use crate::domain::series::timestamp_millis;
use crate::domain::TimeSeries;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Sink rejected the write. Fatal to the run; nothing is retried.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("sink rejected write for key '{key}': {reason}")]
    Rejected { key: String, reason: String },

    #[error("I/O error writing {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("encoding error: {0}")]
    Encode(String),
}

/// Acknowledgement of a completed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub key: String,
    pub location: String,
    pub rows: usize,
}

/// Destination for the merged series.
pub trait Sink: Send + Sync {
    /// Human-readable name of this sink.
    fn name(&self) -> &str;

    /// Persist `series` under `key`.
    fn write(&self, series: &TimeSeries, key: &str) -> Result<Ack, WriteError>;
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Parquet => "parquet",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Build the file sink for `format` rooted at `dir`.
pub fn file_sink(format: OutputFormat, dir: impl Into<PathBuf>) -> Box<dyn Sink> {
    match format {
        OutputFormat::Parquet => Box::new(ParquetSink::new(dir)),
        OutputFormat::Csv => Box::new(CsvSink::new(dir)),
    }
}

/// Metadata sidecar for a written dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkMeta {
    pub key: String,
    pub rows: usize,
    pub symbols: Vec<String>,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub data_hash: String,
    pub written_at: DateTime<Utc>,
}

/// Parquet file sink.
pub struct ParquetSink {
    dir: PathBuf,
}

impl ParquetSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path to the Parquet file for `key`.
    pub fn data_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.parquet"))
    }

    /// Path to the metadata sidecar for `key`.
    pub fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.meta.json"))
    }

    /// Read back the sidecar for `key`.
    pub fn get_meta(&self, key: &str) -> Option<SinkMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Sink for ParquetSink {
    fn name(&self) -> &str {
        "parquet"
    }

    fn write(&self, series: &TimeSeries, key: &str) -> Result<Ack, WriteError> {
        check_writable(series, key)?;
        create_dir(&self.dir)?;

        let path = self.data_path(key);
        let mut df = series.frame().clone();
        let hash = write_atomic(&path, |file| {
            ParquetWriter::new(file)
                .finish(&mut df)
                .map(|_| ())
                .map_err(|e| WriteError::Encode(format!("write parquet: {e}")))
        })?;

        let timestamps = timestamp_millis(series.frame())
            .map_err(|e| WriteError::Encode(format!("timestamp read: {e}")))?;
        let meta = SinkMeta {
            key: key.to_string(),
            rows: series.len(),
            symbols: series.symbols().iter().map(|s| s.to_string()).collect(),
            first_timestamp: timestamps
                .first()
                .and_then(|ms| DateTime::from_timestamp_millis(*ms)),
            last_timestamp: timestamps
                .last()
                .and_then(|ms| DateTime::from_timestamp_millis(*ms)),
            data_hash: hash,
            written_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| WriteError::Encode(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(key);
        fs::write(&meta_path, meta_json).map_err(|e| io_error(&meta_path, e))?;

        info!(key, rows = series.len(), path = %path.display(), "wrote parquet dataset");
        Ok(Ack {
            key: key.to_string(),
            location: path.display().to_string(),
            rows: series.len(),
        })
    }
}

/// CSV file sink with a header row.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path to the CSV file for `key`.
    pub fn data_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.csv"))
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn write(&self, series: &TimeSeries, key: &str) -> Result<Ack, WriteError> {
        check_writable(series, key)?;
        create_dir(&self.dir)?;

        let path = self.data_path(key);
        let mut df = series.frame().clone();
        write_atomic(&path, |file| {
            CsvWriter::new(file)
                .include_header(true)
                .finish(&mut df)
                .map_err(|e| WriteError::Encode(format!("write csv: {e}")))
        })?;

        info!(key, rows = series.len(), path = %path.display(), "wrote csv dataset");
        Ok(Ack {
            key: key.to_string(),
            location: path.display().to_string(),
            rows: series.len(),
        })
    }
}

// ── File helpers ────────────────────────────────────────────────────

fn check_writable(series: &TimeSeries, key: &str) -> Result<(), WriteError> {
    if key.is_empty() || key.contains(['/', '\\']) {
        return Err(WriteError::Rejected {
            key: key.to_string(),
            reason: "key must be a plain file stem".into(),
        });
    }
    if series.is_empty() {
        return Err(WriteError::Rejected {
            key: key.to_string(),
            reason: "no rows to write".into(),
        });
    }
    Ok(())
}

fn create_dir(dir: &Path) -> Result<(), WriteError> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))
}

fn io_error(path: &Path, e: std::io::Error) -> WriteError {
    WriteError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Write through `encode` into `{path}.tmp`, then rename into place.
///
/// Returns the BLAKE3 hash of the written bytes.
fn write_atomic(
    path: &Path,
    encode: impl FnOnce(fs::File) -> Result<(), WriteError>,
) -> Result<String, WriteError> {
    let tmp_path = path.with_extension("tmp");
    let file = fs::File::create(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;

    if let Err(e) = encode(file) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    let bytes = fs::read(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
    let hash = blake3::hash(&bytes).to_hex().to_string();

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_error(path, e)
    })?;

    Ok(hash)
}
