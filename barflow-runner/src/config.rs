//! Serializable run configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config that
//! fetches yesterday's NFLX and DIS minute bars from Yahoo Finance.

use barflow_core::data::OutputFormat;
use barflow_core::domain::{DateWindow, Symbol};
use barflow_core::indicators::{RollingVwap, ZeroVolumePolicy};
use barflow_core::plan::PipelineSettings;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which market-data provider a run fetches from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Yahoo,
    Synthetic,
}

/// Configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Symbols, one branch each, merged in this order
    pub symbols: Vec<Symbol>,

    /// Day to fetch. `None` means the day before the run.
    pub date: Option<NaiveDate>,

    pub provider: ProviderKind,
    pub aggregation: AggregationConfig,
    pub execution: ExecutionConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregationConfig {
    /// Trailing VWAP window in minutes
    pub window_minutes: u32,
    pub zero_volume: ZeroVolumePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Worker threads for branch execution; 1 runs sequentially
    pub parallelism: usize,

    /// Upper bound on a single provider call
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub format: OutputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["NFLX".to_string(), "DIS".to_string()],
            date: None,
            provider: ProviderKind::default(),
            aggregation: AggregationConfig::default(),
            execution: ExecutionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            zero_volume: ZeroVolumePolicy::default(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            fetch_timeout_secs: 30,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            format: OutputFormat::default(),
        }
    }
}

impl RunConfig {
    /// Load, parse and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("at least one symbol is required".into()));
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.trim().is_empty() {
                return Err(ConfigError::Invalid("symbols must not be blank".into()));
            }
            if !seen.insert(symbol.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate symbol '{symbol}'")));
            }
        }
        if self.aggregation.window_minutes == 0 {
            return Err(ConfigError::Invalid("aggregation.window_minutes must be positive".into()));
        }
        if self.execution.parallelism == 0 {
            return Err(ConfigError::Invalid("execution.parallelism must be at least 1".into()));
        }
        if self.execution.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "execution.fetch_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The day this run covers, given the invocation date.
    pub fn window(&self, today: NaiveDate) -> DateWindow {
        match self.date {
            Some(date) => DateWindow::single_day(date),
            None => DateWindow::yesterday(today),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.fetch_timeout_secs)
    }

    pub fn vwap(&self) -> RollingVwap {
        RollingVwap::new(
            chrono::Duration::minutes(i64::from(self.aggregation.window_minutes)),
            self.aggregation.zero_volume,
        )
    }

    pub fn pipeline_settings(&self, today: NaiveDate) -> PipelineSettings {
        PipelineSettings {
            window: self.window(today),
            fetch_timeout: self.fetch_timeout(),
            vwap: self.vwap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.symbols, vec!["NFLX", "DIS"]);
        assert_eq!(config.aggregation.window_minutes, 15);
        assert_eq!(config.output.format, OutputFormat::Parquet);
    }

    #[test]
    fn parses_every_section() {
        let toml = r#"
            symbols = ["AAPL"]
            date = "2024-03-04"
            provider = "synthetic"

            [aggregation]
            window_minutes = 5
            zero_volume = "null"

            [execution]
            parallelism = 4
            fetch_timeout_secs = 10

            [output]
            dir = "out"
            format = "csv"
        "#;
        let config = RunConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.provider, ProviderKind::Synthetic);
        assert_eq!(config.aggregation.zero_volume, ZeroVolumePolicy::Null);
        assert_eq!(config.execution.parallelism, 4);
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert_eq!(config.vwap().window(), chrono::Duration::minutes(5));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = RunConfig::default();
        config.date = NaiveDate::from_ymd_opt(2024, 3, 4);
        config.execution.parallelism = 2;
        let text = config.to_toml_string().unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn window_defaults_to_yesterday() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let window = RunConfig::default().window(today);
        assert_eq!(window.start(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(window.end(), today);
    }

    #[test]
    fn rejects_invalid_values() {
        for toml in [
            "symbols = []",
            r#"symbols = ["A", "A"]"#,
            r#"symbols = [" "]"#,
            "[aggregation]\nwindow_minutes = 0",
            "[execution]\nparallelism = 0",
            "[execution]\nfetch_timeout_secs = 0",
        ] {
            assert!(
                matches!(RunConfig::from_toml_str(toml), Err(ConfigError::Invalid(_))),
                "accepted: {toml}"
            );
        }
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(
            RunConfig::from_toml_str("symbolz = [\"A\"]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = RunConfig::from_file(Path::new("/nonexistent/barflow.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
