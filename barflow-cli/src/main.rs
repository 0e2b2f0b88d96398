//! barflow CLI: run the minute-bar pipeline, show its plan, print config.
//!
//! Commands:
//! - `run`: fetch, aggregate, merge and write one day of bars
//! - `plan`: print the execution levels of the graph without running it
//! - `config`: print the effective configuration as TOML

use anyhow::{Context, Result};
use barflow_core::data::OutputFormat;
use barflow_core::pipeline::CancellationToken;
use barflow_runner::{
    build_provider, plan_run, run, BranchOutcome, ProviderKind, RunConfig, RunError, RunSummary,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "barflow", about = "barflow: per-minute bar pipeline", version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. info, debug, barflow_core=trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, aggregate, merge and write one day of minute bars.
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Print the run summary as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the execution levels of the pipeline graph.
    Plan {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print the effective configuration as TOML.
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Command-line overrides applied on top of the config file.
#[derive(Args)]
struct Overrides {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbols to process (e.g., NFLX DIS).
    #[arg(long, num_args = 1..)]
    symbols: Option<Vec<String>>,

    /// Day to fetch (YYYY-MM-DD). Defaults to yesterday.
    #[arg(long)]
    date: Option<NaiveDate>,

    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,

    /// Worker threads; 1 runs branches sequentially.
    #[arg(long)]
    parallelism: Option<usize>,

    /// Per-fetch timeout in seconds.
    #[arg(long)]
    fetch_timeout: Option<u64>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    format: Option<FormatArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Yahoo,
    Synthetic,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Parquet,
    Csv,
}

impl Overrides {
    fn load(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };
        if let Some(symbols) = self.symbols {
            config.symbols = symbols;
        }
        if let Some(date) = self.date {
            config.date = Some(date);
        }
        if let Some(provider) = self.provider {
            config.provider = match provider {
                ProviderArg::Yahoo => ProviderKind::Yahoo,
                ProviderArg::Synthetic => ProviderKind::Synthetic,
            };
        }
        if let Some(parallelism) = self.parallelism {
            config.execution.parallelism = parallelism;
        }
        if let Some(secs) = self.fetch_timeout {
            config.execution.fetch_timeout_secs = secs;
        }
        if let Some(dir) = self.output_dir {
            config.output.dir = dir;
        }
        if let Some(format) = self.format {
            config.output.format = match format {
                FormatArg::Parquet => OutputFormat::Parquet,
                FormatArg::Csv => OutputFormat::Csv,
            };
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Run { overrides, json } => run_cmd(overrides.load()?, today, json),
        Commands::Plan { overrides } => plan_cmd(overrides.load()?, today),
        Commands::Config { overrides } => {
            print!("{}", overrides.load()?.to_toml_string()?);
            Ok(())
        }
    }
}

/// Logs go to stderr so `run --json` output stays parseable.
fn init_logging(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .with_context(|| format!("invalid log filter '{default_filter}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn plan_cmd(config: RunConfig, today: NaiveDate) -> Result<()> {
    let provider = build_provider(&config)?;
    let plan = plan_run(&config, today, provider)?;
    println!("window: {}", config.window(today));
    println!("{}", plan.describe());
    Ok(())
}

fn run_cmd(config: RunConfig, today: NaiveDate, json: bool) -> Result<()> {
    match run(&config, today, &CancellationToken::new()) {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
        Err(err) => {
            if !err.outcomes().is_empty() {
                print_outcomes(err.outcomes());
            }
            report_failure(&err);
            std::process::exit(1);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    print_outcomes(&summary.outcomes);
    println!();
    println!("Key:      {}", summary.key);
    println!("Rows:     {}", summary.rows);
    println!("Written:  {}", summary.ack.location);

    let failed = summary.failed_symbols();
    if !failed.is_empty() {
        println!("Failed:   {}", failed.join(" "));
    }
}

fn print_outcomes(outcomes: &[BranchOutcome]) {
    println!("{:<8} {:<10} {:>8}  Detail", "Symbol", "Status", "Rows");
    println!("{}", "-".repeat(50));
    for outcome in outcomes {
        match outcome {
            BranchOutcome::Succeeded { symbol, rows } => {
                println!("{:<8} {:<10} {:>8}", symbol, "ok", rows);
            }
            BranchOutcome::Empty { symbol } => {
                println!("{:<8} {:<10} {:>8}  no rows", symbol, "empty", 0);
            }
            BranchOutcome::Failed {
                symbol,
                stage,
                reason,
            } => {
                println!("{:<8} {:<10} {:>8}  {stage}: {reason}", symbol, "failed", "-");
            }
        }
    }
}

fn report_failure(err: &RunError) {
    eprintln!("Error: {err}");
    let failed = err.failed_symbols();
    if !failed.is_empty() {
        eprintln!("Retry with: --symbols {}", failed.join(" "));
    }
}
