//! ticker-metrics CLI - compute, persist and export metrics for one ticker
//!
//! ## Example Usage
//!
//! ```bash
//! # Fetch five years from Yahoo Finance, store in SQLite and write out/AAPL.json
//! ticker-metrics run --ticker AAPL
//!
//! # Run offline from CSV files
//! ticker-metrics run -t AAPL --prices-csv aapl.csv --fundamentals-csv aapl_q.csv
//!
//! # List stored crossover events
//! ticker-metrics signals --ticker AAPL
//! ```

use anyhow::{bail, Context as _};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use ticker_metrics::error::MetricsError;
use ticker_metrics::export::{ExportNotes, ExportPayload};
use ticker_metrics::pipeline::{process_bundle, PipelineConfig};
use ticker_metrics::signals::detect_crossovers;
use ticker_metrics::sources::{fetch_raw_bundle, CsvSource, HistoryPeriod, RetryPolicy};
use ticker_metrics::storage::MetricsStore;
use ticker_metrics::types::{RawBundle, SignalType};

/// ticker-metrics: moving-average crossovers and valuation metrics for one ticker
#[derive(Parser)]
#[command(name = "ticker-metrics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Daily metrics and crossover signals for a single ticker", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, process, persist and export one ticker
    Run {
        /// Stock symbol
        #[arg(short = 't', long)]
        ticker: String,

        /// Output JSON file (default: <output_dir>/<TICKER>.json)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Read prices from a CSV file instead of Yahoo Finance
        #[arg(long)]
        prices_csv: Option<PathBuf>,

        /// Quarterly fundamentals CSV (used with --prices-csv)
        #[arg(long, requires = "prices_csv")]
        fundamentals_csv: Option<PathBuf>,
    },

    /// List stored crossover events for a ticker
    Signals {
        /// Stock symbol
        #[arg(short = 't', long)]
        ticker: String,
    },

    /// Show configuration and stored tickers
    Info,
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default = "default_db_path")]
    db_path: PathBuf,
    #[serde(default = "default_output_dir")]
    output_dir: PathBuf,
    #[serde(default = "default_period")]
    historical_period: String,
    #[serde(default = "default_min_sma_days")]
    min_sma_days: usize,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_retries")]
    retries: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("app.db")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_period() -> String {
    "5y".to_string()
}

fn default_min_sma_days() -> usize {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retries() -> u32 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            output_dir: default_output_dir(),
            historical_period: default_period(),
            min_sma_days: default_min_sma_days(),
            log_level: default_log_level(),
            retries: default_retries(),
        }
    }
}

impl Config {
    fn load(path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match path {
            Some(path) => vec![path.to_path_buf()],
            None => {
                let mut paths = vec![PathBuf::from("config.toml")];
                if let Some(home) = dirs::home_dir() {
                    paths.push(home.join(".ticker-metrics").join("config.toml"));
                }
                paths
            }
        };

        for config_path in candidates {
            if !config_path.exists() {
                continue;
            }
            match fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("{} Failed to parse config: {}", "Warning:".yellow(), e);
                    }
                },
                Err(e) => {
                    eprintln!("{} Failed to read config: {}", "Warning:".yellow(), e);
                }
            }
        }

        Config::default()
    }

    fn period(&self) -> Result<HistoryPeriod, MetricsError> {
        self.historical_period.parse()
    }

    fn pipeline(&self) -> Result<PipelineConfig, MetricsError> {
        PipelineConfig::new(self.min_sma_days)
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(500))
    }
}

fn init_logging(config: &Config) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();
}

fn main() {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_deref());
    init_logging(&config);

    if cli.verbose {
        println!(
            "{} v{}",
            "ticker-metrics".cyan().bold(),
            env!("CARGO_PKG_VERSION")
        );
        println!("Database: {}", config.db_path.display().to_string().dimmed());
    }

    let result = match cli.command {
        Commands::Run {
            ticker,
            output,
            prices_csv,
            fundamentals_csv,
        } => run_ticker(RunConfig {
            ticker,
            output,
            prices_csv,
            fundamentals_csv,
            verbose: cli.verbose,
            config,
        }),
        Commands::Signals { ticker } => show_signals(&ticker, &config),
        Commands::Info => show_info(&config),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

struct RunConfig {
    ticker: String,
    output: Option<PathBuf>,
    prices_csv: Option<PathBuf>,
    fundamentals_csv: Option<PathBuf>,
    verbose: bool,
    config: Config,
}

fn spinner(message: &str) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_string());
    Ok(pb)
}

#[cfg(feature = "async")]
fn fetch_remote(ticker: &str, period: HistoryPeriod, retry: &RetryPolicy) -> anyhow::Result<RawBundle> {
    use ticker_metrics::sources::YahooFinanceSource;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let source = YahooFinanceSource::new()?;
    Ok(runtime.block_on(source.fetch_raw_bundle(ticker, period, retry))?)
}

#[cfg(not(feature = "async"))]
fn fetch_remote(_ticker: &str, _period: HistoryPeriod, _retry: &RetryPolicy) -> anyhow::Result<RawBundle> {
    Err(anyhow::anyhow!(
        "built without the `async` feature; pass --prices-csv to run from a file"
    ))
}

fn run_ticker(cfg: RunConfig) -> anyhow::Result<()> {
    let ticker = cfg.ticker.trim().to_string();
    if ticker.is_empty() {
        bail!("ticker must not be empty");
    }
    let config = &cfg.config;
    let period = config.period()?;
    let pipeline_config = config.pipeline()?;
    let retry = config.retry();

    log::info!("Starting run for {}", ticker);

    let output_path = cfg
        .output
        .clone()
        .unwrap_or_else(|| config.output_dir.join(format!("{}.json", ticker.to_uppercase())));

    if cfg.verbose {
        println!("  {} {}", "Ticker:".bold(), ticker);
        println!("  {} {}", "Period:".bold(), period);
        println!("  {} {}", "Long window:".bold(), pipeline_config.long_window);
        println!();
    }

    // Fetch
    let pb = spinner(&format!("Fetching {}...", ticker))?;
    let fetched = match &cfg.prices_csv {
        Some(prices) => {
            let mut source = CsvSource::new(prices);
            if let Some(fundamentals) = &cfg.fundamentals_csv {
                source = source.with_fundamentals(fundamentals);
            }
            fetch_raw_bundle(&source, &ticker, period, &retry)
                .map(|bundle| (bundle, "csv"))
                .map_err(anyhow::Error::from)
        }
        None => fetch_remote(&ticker, period, &retry).map(|bundle| (bundle, "yahoo")),
    };
    pb.finish_and_clear();
    let (bundle, data_source) = fetched?;
    log::info!("Fetched {} price rows for {}", bundle.prices.len(), ticker);

    // Process
    let output = process_bundle(&bundle, &pipeline_config)?;
    if output.is_empty() {
        return Err(MetricsError::EmptyPriceHistory { ticker }.into());
    }
    let short_history = output.is_short_history(&pipeline_config);
    log::info!("Processed {} rows; short_history={}", output.len(), short_history);

    // Persist metrics
    let mut store = MetricsStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    store.upsert_ticker(&ticker)?;
    store.upsert_daily(&ticker, &output.metrics)?;

    // Detect and persist signals
    let (events, contexts) = detect_crossovers(&ticker, &output.rows);
    let inserted = store.upsert_signals(&ticker, &events)?;
    log::info!("{} crossover events ({} new)", events.len(), inserted);

    // Export
    let payload = ExportPayload {
        ticker: ticker.clone(),
        generated_at: Utc::now(),
        metrics: output.rows.clone(),
        signals: events.clone(),
        notes: ExportNotes {
            rows: output.len(),
            min_sma_days: pipeline_config.long_window,
            data_source: data_source.to_string(),
            short_history,
            event_contexts: contexts,
        },
    };
    payload.write_json(&output_path)?;

    // Console summary
    println!("{} Saved: {}", "✓".green().bold(), output_path.display());
    println!(
        "{} Database updated at {}",
        "✓".green().bold(),
        config.db_path.display()
    );
    if short_history {
        println!(
            "{}",
            format!(
                "  Only {} rows; fewer than the {}-day window.",
                output.len(),
                pipeline_config.long_window
            )
            .yellow()
        );
    }
    if events.is_empty() {
        println!("  No crossovers in the selected period.");
    } else {
        println!("{} Signals found: {}", "⚡".yellow(), events.len());
        for event in events.iter().take(5) {
            println!("  - {} on {}", event.kind, event.date);
        }
    }

    Ok(())
}

fn show_signals(ticker: &str, config: &Config) -> anyhow::Result<()> {
    let store = MetricsStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let events = store.load_signals(ticker)?;
    let rows = store.count_daily(ticker)?;

    println!("{}", format!("Signals for {}", ticker).cyan().bold());
    println!("  {} {}", "Stored rows:".bold(), rows);
    if events.is_empty() {
        println!("  No crossovers stored.");
    }
    for event in &events {
        let label = match event.kind {
            SignalType::GoldenCross => event.kind.to_string().green(),
            SignalType::DeathCross => event.kind.to_string().red(),
        };
        println!("  {}  {}", event.date, label);
    }
    Ok(())
}

fn show_info(config: &Config) -> anyhow::Result<()> {
    println!("{}", "ticker-metrics".cyan().bold());
    println!("  {} {}", "Version:".bold(), env!("CARGO_PKG_VERSION"));
    println!("  {} {}", "Database:".bold(), config.db_path.display());
    println!("  {} {}", "Output dir:".bold(), config.output_dir.display());
    println!("  {} {}", "Period:".bold(), config.historical_period);
    println!("  {} {}", "Long window:".bold(), config.min_sma_days);
    println!(
        "  {} {}",
        "Yahoo source:".bold(),
        if cfg!(feature = "async") { "enabled" } else { "disabled" }
    );

    if config.db_path.exists() {
        let store = MetricsStore::open(&config.db_path)?;
        let tickers = store.tickers()?;
        println!("  {} {}", "Stored tickers:".bold(), tickers.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_parsing() {
        let args = vec!["ticker-metrics", "info"];
        let _cli = Cli::try_parse_from(args).unwrap();
    }

    #[test]
    fn test_run_command() {
        let args = vec![
            "ticker-metrics",
            "run",
            "--ticker",
            "AAPL",
            "-o",
            "out/aapl.json",
            "--prices-csv",
            "aapl.csv",
            "--fundamentals-csv",
            "aapl_q.csv",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run { ticker, prices_csv, .. } => {
                assert_eq!(ticker, "AAPL");
                assert_eq!(prices_csv, Some(PathBuf::from("aapl.csv")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_fundamentals_requires_prices_csv() {
        let args = vec!["ticker-metrics", "run", "-t", "AAPL", "--fundamentals-csv", "q.csv"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_run_requires_ticker() {
        assert!(Cli::try_parse_from(vec!["ticker-metrics", "run"]).is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.db_path, PathBuf::from("data").join("app.db"));
        assert_eq!(config.min_sma_days, 200);
        assert_eq!(config.period().unwrap(), HistoryPeriod::Years(5));
    }

    #[test]
    fn test_partial_config_file() {
        let config: Config = toml::from_str("min_sma_days = 100\nhistorical_period = \"2y\"").unwrap();
        assert_eq!(config.min_sma_days, 100);
        assert_eq!(config.period().unwrap(), HistoryPeriod::Years(2));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.pipeline().unwrap().long_window, 100);
    }

    #[test]
    fn test_invalid_config_values() {
        let config: Config = toml::from_str("min_sma_days = 0\nhistorical_period = \"3w\"").unwrap();
        assert!(config.period().is_err());
        assert!(config.pipeline().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "db_path = \"x/y.db\"\nretries = 5").unwrap();
        let config = Config::load(Some(&path));
        assert_eq!(config.db_path, PathBuf::from("x/y.db"));
        assert_eq!(config.retry().attempts, 5);
    }
}
