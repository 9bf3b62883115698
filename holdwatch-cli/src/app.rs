use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use holdwatch_config::{load_config, AppConfig};
use holdwatch_store::{SnapshotRepository, SqliteSnapshotStore};
use rust_decimal::Decimal;
use tracing::info;

use crate::pipeline::{http_fetcher, run_ingest, PipelineOptions};
use crate::reconcile::{write_diff_csv, DiffKind, SnapshotDiffer, SnapshotRef};
use crate::serve::run_server;
use crate::telemetry::{init_tracing, TelemetryOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Fund holdings ingestion and snapshot diffing")]
pub struct Cli {
    /// Configuration file (defaults to ./holdwatch.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// Emit console logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    /// Also write JSON logs to daily files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every configured source, store the snapshots and write artifacts
    Ingest(IngestArgs),
    /// Compare two snapshots (CSV artifact paths, FUND@YYYY-MM-DD or *@YYYY-MM-DD)
    Diff(DiffArgs),
    /// List stored snapshot keys
    Snapshots(SnapshotsArgs),
    /// Serve stored holdings over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// CSV artifact path (overrides output.csv)
    #[arg(long)]
    out: Option<PathBuf>,
    /// JSON artifact path (overrides output.json)
    #[arg(long)]
    json: Option<PathBuf>,
    /// Skip the JSON artifact
    #[arg(long, conflicts_with = "json")]
    no_json: bool,
    /// Snapshot to diff against; `latest` picks the previous stored key per fund
    #[arg(long)]
    prev: Option<String>,
    /// Diff report path (defaults next to the CSV artifact)
    #[arg(long)]
    diff_out: Option<PathBuf>,
    /// Absolute change below which numeric fields count as unchanged
    #[arg(long)]
    tolerance: Option<Decimal>,
    /// Snapshot database (overrides storage.database)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Do not write to the snapshot database
    #[arg(long, conflicts_with = "db")]
    no_store: bool,
    /// Run-wide timeout in seconds (overrides run.timeout_secs)
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    before: String,
    after: String,
    #[arg(long)]
    tolerance: Option<Decimal>,
    /// Write the report as CSV here
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SnapshotsArgs {
    #[arg(long)]
    fund: Option<String>,
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,
    #[arg(long)]
    db: Option<PathBuf>,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(TelemetryOptions {
        level: &cli.log_level,
        json: cli.log_json,
        log_dir: cli.log_dir.as_deref(),
    })?;
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest(args) => args.run(&config).await,
        Commands::Diff(args) => args.run(&config),
        Commands::Snapshots(args) => args.run(&config),
        Commands::Serve(args) => args.run(&config).await,
    }
}

fn open_store(config: &AppConfig, db: Option<PathBuf>) -> Result<SqliteSnapshotStore> {
    let path = db.unwrap_or_else(|| config.storage.database.clone());
    SqliteSnapshotStore::new(&path)
        .with_context(|| format!("failed to open snapshot database {}", path.display()))
}

impl IngestArgs {
    async fn run(self, config: &AppConfig) -> Result<()> {
        if config.sources.is_empty() {
            bail!("no sources configured");
        }
        let mut options = PipelineOptions::from_config(config);
        if let Some(out) = self.out {
            options.csv_out = out;
        }
        if self.no_json {
            options.json_out = None;
        } else if let Some(json) = self.json {
            options.json_out = Some(json);
        }
        if self.no_store {
            options.database = None;
        } else if let Some(db) = self.db {
            options.database = Some(db);
        }
        if let Some(prev) = self.prev {
            options.previous = Some(prev);
        }
        if let Some(diff_out) = self.diff_out {
            options.diff_out = Some(diff_out);
        }
        if let Some(tolerance) = self.tolerance {
            options.tolerance = tolerance.abs();
        }
        if let Some(timeout) = self.timeout {
            options.run_timeout = Duration::from_secs(timeout);
        }

        let fetcher = Arc::new(http_fetcher(config)?);
        let report = run_ingest(config, fetcher, &options).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        if let Some(err) = &report.diff_error {
            bail!("diff step failed: {err}");
        }
        if report.nothing_ingested() {
            bail!("no source produced holdings");
        }
        Ok(())
    }
}

impl DiffArgs {
    fn run(self, config: &AppConfig) -> Result<()> {
        let before = SnapshotRef::parse(&self.before)?;
        let after = SnapshotRef::parse(&self.after)?;
        let store = if before.needs_store() || after.needs_store() {
            Some(open_store(config, self.db)?)
        } else {
            None
        };
        let store_ref = store.as_ref().map(|store| store as &dyn SnapshotRepository);
        let before = before.load(store_ref)?;
        let after = after.load(store_ref)?;

        let tolerance = self.tolerance.unwrap_or(config.diff.tolerance);
        let diff = SnapshotDiffer::new(tolerance).diff(&before, &after);
        if let Some(out) = &self.out {
            write_diff_csv(out, &diff)?;
        }
        info!(
            added = diff.count(DiffKind::Added),
            removed = diff.count(DiffKind::Removed),
            changed = diff.count(DiffKind::Changed),
            "diff complete"
        );
        println!("{}", serde_json::to_string_pretty(&diff)?);
        Ok(())
    }
}

impl SnapshotsArgs {
    fn run(self, config: &AppConfig) -> Result<()> {
        let store = open_store(config, self.db)?;
        let snapshots = store.list_snapshots(self.fund.as_deref())?;
        if snapshots.is_empty() {
            println!("no snapshots stored");
        }
        for summary in snapshots {
            println!("{:<24} {:>8} rows", summary.key.to_string(), summary.rows);
        }
        Ok(())
    }
}

impl ServeArgs {
    async fn run(self, config: &AppConfig) -> Result<()> {
        let store: Arc<dyn SnapshotRepository> = Arc::new(open_store(config, self.db)?);
        run_server(self.addr, store, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
    }
}
