//! trendwatch - trending score engine and series lifecycle manager
//!
//! Runs one batch pass per invocation against the sled database in the data
//! directory. Scheduling is left to cron or whatever drives the fetchers.
//!
//! # Usage
//!
//! ```bash
//! # Check the config file without touching the database
//! trendwatch validate-config
//!
//! # Score a batch of entities fetched upstream
//! trendwatch evaluate --metrics metrics.json
//!
//! # Roll up last week's snapshots and prune old aggregates
//! trendwatch rollup --from 2024-06-01 --to 2024-06-07 --period weekly
//!
//! # Advance series lifecycles
//! trendwatch lifecycle --series series.json
//! ```
//!
//! # Environment Variables
//!
//! - `TRENDWATCH_CONFIG`: Path to the TOML config (default: ./trending_config.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use trendwatch::config::EngineConfig;
use trendwatch::lifecycle::LifecycleStats;
use trendwatch::pipeline::BatchRunner;
use trendwatch::storage::{ProcessLock, SledStore, StorageStats};
use trendwatch::types::{EntityMetrics, PeriodType, SeriesInput};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "trendwatch")]
#[command(about = "Trending score engine and series lifecycle manager")]
#[command(version)]
struct CliArgs {
    /// Config file path; overrides TRENDWATCH_CONFIG and ./trending_config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding the database and lock file (default: batch.data_dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Evaluation instant, RFC 3339 (default: now)
    #[arg(long, global = true)]
    as_of: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Load and validate the config, then exit
    ValidateConfig,

    /// Print the effective config as TOML
    PrintConfig {
        /// Print the built-in defaults instead of the loaded file
        #[arg(long)]
        defaults: bool,
    },

    /// Score every entity in a JSON array of metrics and append the snapshots
    Evaluate {
        #[arg(long)]
        metrics: PathBuf,
        /// Also write the produced scores to this JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Aggregate snapshots in [from, to] and prune expired aggregates
    Rollup {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Period types to build (default: all)
        #[arg(long = "period")]
        periods: Vec<PeriodType>,
    },

    /// Advance every series in a JSON array of series metrics
    ///
    /// Entries may list `character_ids`; stored trending scores for the series
    /// and those characters replace the supplied trending fields.
    Lifecycle {
        #[arg(long)]
        series: PathBuf,
    },

    /// Move released series from UPCOMING into their grace period
    Promote {
        #[arg(long = "series-id", required = true)]
        series_ids: Vec<u64>,
    },

    /// Archive a series regardless of its scores
    Archive {
        #[arg(long)]
        series_id: u64,
        #[arg(long)]
        reason: String,
    },

    /// Return an archived series to active tracking
    Restore {
        #[arg(long)]
        series_id: u64,
        #[arg(long)]
        reason: String,
    },

    /// Print lifecycle and storage statistics as JSON
    Stats,
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::load_from_file(p),
        None => EngineConfig::load(),
    };
    config.context("refusing to start without a valid config")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Everything a database-backed command needs. The lock is released on drop.
struct Runtime {
    runner: Arc<BatchRunner>,
    store: Arc<SledStore>,
    _process_lock: ProcessLock,
}

fn open_runtime(config: &EngineConfig, data_dir: Option<PathBuf>) -> Result<Runtime> {
    let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(&config.batch.data_dir));
    let process_lock = ProcessLock::acquire(&data_dir)?;
    let store = Arc::new(
        SledStore::open_in(&data_dir)
            .with_context(|| format!("failed to open database in {}", data_dir.display()))?,
    );
    let runner = BatchRunner::with_store(config, store.clone())?;
    info!(data_dir = %data_dir.display(), "Database opened");
    Ok(Runtime {
        runner: Arc::new(runner),
        store,
        _process_lock: process_lock,
    })
}

/// Run blocking pass work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("batch task panicked")?
}

#[derive(Serialize)]
struct StatsOutput {
    lifecycle: LifecycleStats,
    storage: StorageStats,
    storage_size_mb: f64,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let now = args.as_of.unwrap_or_else(Utc::now);

    match args.command {
        SubCommand::ValidateConfig => {
            let config = load_config(args.config.as_deref())?;
            println!("config OK (algorithm {})", config.algorithm.version);
            return Ok(());
        }
        SubCommand::PrintConfig { defaults } => {
            let config = if defaults {
                EngineConfig::default()
            } else {
                load_config(args.config.as_deref())?
            };
            print!("{}", config.to_toml()?);
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(args.config.as_deref())?;
    let rt = open_runtime(&config, args.data_dir)?;

    let cancel = CancellationToken::new();
    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Received Ctrl+C, finishing in-flight entities and stopping");
        shutdown_token.cancel();
    });

    let runner = rt.runner.clone();
    match args.command {
        SubCommand::ValidateConfig | SubCommand::PrintConfig { .. } => {}

        SubCommand::Evaluate { metrics, output } => {
            let metrics: Vec<EntityMetrics> = read_json(&metrics)?;
            info!(entities = metrics.len(), as_of = %now, "Starting evaluation pass");
            let (report, scores) =
                blocking(move || Ok(runner.evaluate_pass(&metrics, now, &cancel))).await?;
            println!("{report}");
            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&scores)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                info!(path = %path.display(), scores = scores.len(), "Scores written");
            }
        }

        SubCommand::Rollup { from, to, periods } => {
            anyhow::ensure!(from <= to, "--from {from} is after --to {to}");
            let periods = if periods.is_empty() {
                PeriodType::ALL.to_vec()
            } else {
                periods
            };
            let today = now.date_naive();
            let report = blocking(move || {
                runner
                    .rollup_pass(from, to, &periods, today)
                    .context("rollup pass failed")
            })
            .await?;
            println!("{report}");
        }

        SubCommand::Lifecycle { series } => {
            let series: Vec<SeriesInput> = read_json(&series)?;
            info!(series = series.len(), "Starting lifecycle pass");
            let report =
                blocking(move || Ok(runner.lifecycle_pass_from_scores(&series, now, &cancel))).await?;
            println!("{report}");
        }

        SubCommand::Promote { series_ids } => {
            let report = blocking(move || Ok(runner.promote_released(&series_ids, now))).await?;
            println!("{report}");
        }

        SubCommand::Archive { series_id, reason } => {
            let record = blocking(move || {
                runner
                    .lifecycle()
                    .force_archive(series_id, &reason, now)
                    .with_context(|| format!("failed to archive series {series_id}"))
            })
            .await?;
            println!("series {} is now {}", record.series_id, record.stage);
        }

        SubCommand::Restore { series_id, reason } => {
            let record = blocking(move || {
                runner
                    .lifecycle()
                    .restore(series_id, &reason, now)
                    .with_context(|| format!("failed to restore series {series_id}"))
            })
            .await?;
            println!("series {} is now {}", record.series_id, record.stage);
        }

        SubCommand::Stats => {
            let store = rt.store.clone();
            let output = blocking(move || {
                let storage = store.stats();
                Ok(StatsOutput {
                    lifecycle: runner.lifecycle().stats(now)?,
                    storage_size_mb: storage.size_mb(),
                    storage,
                })
            })
            .await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    rt.store.flush().context("failed to flush database")?;
    info!("Done");
    Ok(())
}
