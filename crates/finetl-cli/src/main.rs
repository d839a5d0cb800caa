//! finetl CLI: fetch, replay, derive and inspect financial statements.
//!
//! Commands:
//! - `run` - fetch every configured company, store statements, derive metrics
//! - `extract` - fetch raw payloads into a snapshot file
//! - `load` - ingest a snapshot file without API calls
//! - `metrics` - recompute metrics from stored statements
//! - `report` - print stored metrics or statements
//! - `quota` - show the persisted API quota counters

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use finetl::{
    CancelFlag, CompanySpec, Config, DEFAULT_QUOTA_KEY, DataPeriod, Pipeline, QuotaStateStore,
    Snapshot, StatementFilter, StatementStore,
};
use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "finetl",
    version,
    about = "Financial statement ETL over the Alpha Vantage API"
)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(flatten)]
    logging: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags layered on top of the environment configuration.
#[derive(clap::Args)]
struct Overrides {
    /// SQLite database file.
    #[arg(long, global = true)]
    database_path: Option<PathBuf>,

    /// Alpha Vantage API key.
    #[arg(long, global = true, hide_env_values = true, env = "ALPHAVANTAGE_API_KEY")]
    api_key: Option<String>,

    /// Companies as `Name=TICKER;Name=TICKER`.
    #[arg(long, global = true)]
    companies: Option<String>,

    /// Most recent reports kept per statement kind (0 keeps all).
    #[arg(long, global = true)]
    report_limit: Option<usize>,

    /// Report period: annual, quarterly or both.
    #[arg(long, global = true)]
    period: Option<String>,

    /// Abort the run after this many seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

/// Where log output goes besides stderr.
#[derive(clap::Args)]
struct LogArgs {
    /// Log file. Defaults to `LOG_FILE`, then a timestamped file under `logs/`.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log to stderr only.
    #[arg(long, global = true, default_value_t = false)]
    no_log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize and store every configured company, then derive metrics.
    Run,
    /// Fetch raw payloads into a snapshot file without writing the database.
    Extract {
        /// Snapshot file to write.
        #[arg(long, default_value = "financial_data.json")]
        output: PathBuf,
    },
    /// Ingest a snapshot file without API calls.
    Load {
        /// Snapshot file to read.
        #[arg(long, default_value = "financial_data.json")]
        input: PathBuf,
    },
    /// Recompute metrics for every stored company.
    Metrics,
    /// Print stored metrics, or statements with `--statements`.
    Report {
        /// Show statements instead of metrics.
        #[arg(long, default_value_t = false)]
        statements: bool,

        /// Restrict to one ticker.
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Show the persisted API quota counters.
    Quota,
}

impl Overrides {
    fn apply(self, mut config: Config) -> Result<Config> {
        if let Some(path) = self.database_path {
            config = config.with_database_path(path);
        }
        if let Some(key) = self.api_key {
            config = config.with_api_key(key);
        }
        if let Some(roster) = self.companies {
            config = config.with_companies(CompanySpec::parse_roster(&roster)?);
        }
        if let Some(limit) = self.report_limit {
            config = config.with_report_limit((limit > 0).then_some(limit));
        }
        if let Some(period) = self.period {
            config = config.with_data_period(period.parse::<DataPeriod>()?);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_run_timeout(Some(Duration::from_secs(secs)));
        }
        Ok(config)
    }
}

/// `RUST_LOG` wins, then `LOG_LEVEL`, then `info`.
fn filter_directive(rust_log: Option<String>, log_level: Option<String>) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            log_level
                .map(|level| level.trim().to_ascii_lowercase())
                .filter(|level| !level.is_empty())
        })
        .unwrap_or_else(|| "info".to_string())
}

/// One file per invocation, e.g. `logs/finetl_20240315T100000123456Z.log`.
fn default_log_path(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from("logs").join(format!("finetl_{}.log", now.format("%Y%m%dT%H%M%S%6fZ")))
}

/// Installs stderr logging plus, unless disabled, a plain-text file layer.
/// Returns the log file in use.
fn init_logging(args: &LogArgs) -> Result<Option<PathBuf>> {
    let directive = filter_directive(env::var("RUST_LOG").ok(), env::var("LOG_LEVEL").ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let path = (!args.no_log_file).then(|| {
        args.log_file
            .clone()
            .or_else(|| env::var_os("LOG_FILE").map(PathBuf::from))
            .unwrap_or_else(|| default_log_path(Utc::now()))
    });

    let file_layer = match &path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Loads `.env` first so LOG_LEVEL and LOG_FILE can come from it.
    let config = cli
        .overrides
        .apply(Config::from_env()?)
        .context("invalid configuration")?;

    if let Some(path) = init_logging(&cli.logging)? {
        info!(path = %path.display(), "Logging to file");
    }

    match cli.command {
        Commands::Run => cmd_run(&config).await,
        Commands::Extract { output } => cmd_extract(&config, output).await,
        Commands::Load { input } => cmd_load(&config, input).await,
        Commands::Metrics => cmd_metrics(&config).await,
        Commands::Report { statements, ticker } => {
            cmd_report(&config, statements, ticker.as_deref()).await
        }
        Commands::Quota => cmd_quota(&config),
    }
}

/// Cancels the pipeline on the first Ctrl-C. A request already sent finishes;
/// quota waits and backoff end at once.
fn cancel_on_ctrl_c(flag: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current request");
            flag.cancel();
        }
    });
}

async fn cmd_run(config: &Config) -> Result<()> {
    let store = finetl::open_store(config)?;
    let pipeline = Pipeline::from_config(config, store)?;
    cancel_on_ctrl_c(pipeline.cancel_flag().clone());

    let summary = pipeline.run(&config.companies).await?;
    println!("{summary}");
    if summary.cancelled {
        bail!("run cancelled before completion");
    }
    Ok(())
}

async fn cmd_extract(config: &Config, output: PathBuf) -> Result<()> {
    let store = finetl::open_store(config)?;
    let pipeline = Pipeline::from_config(config, store)?;
    cancel_on_ctrl_c(pipeline.cancel_flag().clone());

    let (snapshot, summary) = pipeline.extract(&config.companies).await?;
    snapshot
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(path = %output.display(), companies = snapshot.len(), "Snapshot written");
    println!("{summary}");
    Ok(())
}

async fn cmd_load(config: &Config, input: PathBuf) -> Result<()> {
    let snapshot =
        Snapshot::load(&input).with_context(|| format!("reading {}", input.display()))?;
    let store = finetl::open_store(config)?;
    let pipeline = Pipeline::offline_from_config(config, store);

    let summary = pipeline.load_snapshot(&snapshot, &config.companies).await;
    println!("{summary}");
    Ok(())
}

async fn cmd_metrics(config: &Config) -> Result<()> {
    let store = finetl::open_store(config)?;
    let pipeline = Pipeline::offline_from_config(config, store);

    let summary = pipeline.compute_metrics().await?;
    println!(
        "{} companies, {} metrics written, {} metrics failed",
        summary.companies, summary.written, summary.failed
    );
    for (id, reason) in &summary.failed_companies {
        println!("  company {id}: {reason}");
    }
    Ok(())
}

async fn cmd_report(config: &Config, statements: bool, ticker: Option<&str>) -> Result<()> {
    let store = finetl::open_store(config)?;

    let company_id = match ticker {
        Some(ticker) => match store.company_by_ticker(ticker).await? {
            Some(company) => Some(company.id),
            None => bail!("no stored company with ticker {ticker}"),
        },
        None => None,
    };

    let frame = if statements {
        let filter = match company_id {
            Some(id) => StatementFilter::all().company(id),
            None => StatementFilter::all(),
        };
        store.statements_frame(filter)?
    } else {
        store.metrics_frame(company_id)?
    };

    if frame.height() == 0 {
        println!("No rows stored yet.");
    } else {
        println!("{frame}");
    }
    Ok(())
}

fn cmd_quota(config: &Config) -> Result<()> {
    let store = finetl::open_store(config)?;
    let limits = config.quota;

    let Some(state) = store.load_quota(DEFAULT_QUOTA_KEY)? else {
        println!(
            "No calls recorded (limits: {}/minute, {}/day)",
            limits.per_minute, limits.per_day
        );
        return Ok(());
    };

    let now = Utc::now();
    let today = if state.day == now.date_naive() {
        state.day_count
    } else {
        0
    };
    let recent = state
        .minute_calls
        .iter()
        .filter(|at| now.signed_duration_since(**at) < chrono::Duration::seconds(60))
        .count();

    println!("Day {}: {}/{} calls", now.date_naive(), today, limits.per_day);
    println!("Last minute: {}/{} calls", recent, limits.per_minute);
    println!("Updated: {}", state.updated_at);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_filter_directive_precedence() {
        let some = |s: &str| Some(s.to_string());
        assert_eq!(filter_directive(some("finetl=debug"), some("WARNING")), "finetl=debug");
        assert_eq!(filter_directive(None, some("DEBUG")), "debug");
        assert_eq!(filter_directive(some(" "), some("warn")), "warn");
        assert_eq!(filter_directive(None, None), "info");
    }

    #[test]
    fn test_default_log_path_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        assert_eq!(
            default_log_path(now),
            PathBuf::from("logs/finetl_20240315T100000000000Z.log")
        );
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let cli = Cli::parse_from([
            "finetl",
            "--companies",
            "TE Connectivity=TEL",
            "--report-limit",
            "0",
            "--period",
            "both",
            "--no-log-file",
            "run",
        ]);
        assert!(cli.logging.no_log_file);

        let config = cli.overrides.apply(Config::default()).unwrap();
        assert_eq!(config.companies, vec![CompanySpec::new("TE Connectivity", "TEL")]);
        assert_eq!(config.report_limit, None);
        assert_eq!(config.data_period, DataPeriod::Both);
    }
}
