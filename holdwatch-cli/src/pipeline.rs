//! One ingest run end to end: sources, store, artifacts and the optional diff.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use holdwatch_config::{AppConfig, AppendPolicySetting};
use holdwatch_core::{HoldingRecord, RunWarning, Snapshot, SnapshotKey, WarningStage};
use holdwatch_data::{
    HttpFetcher, HttpFetcherConfig, IngestOptions, Ingestor, RunContext, RunSummary,
    SourceFetcher, SourceReport,
};
use holdwatch_store::{
    write_csv, write_json, AppendPolicy, SnapshotRepository, SqliteSnapshotStore, StoreError,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::reconcile::{write_diff_csv, DiffKind, SnapshotDiffer, SnapshotRef};

/// Reference value selecting, per fund in the run, the latest stored snapshot before it.
pub const PREVIOUS_LATEST: &str = "latest";

/// Everything an ingest run needs beyond the source list.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub csv_out: PathBuf,
    pub json_out: Option<PathBuf>,
    /// `None` skips the snapshot store entirely.
    pub database: Option<PathBuf>,
    pub append_policy: AppendPolicy,
    pub previous: Option<String>,
    pub diff_out: Option<PathBuf>,
    pub tolerance: Decimal,
    pub run_timeout: Duration,
    pub max_concurrent_sources: usize,
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            csv_out: config.output.csv.clone(),
            json_out: config.output.json.clone(),
            database: Some(config.storage.database.clone()),
            append_policy: match config.storage.append_policy {
                AppendPolicySetting::Replace => AppendPolicy::Replace,
                AppendPolicySetting::Reject => AppendPolicy::Reject,
            },
            previous: config.diff.previous.clone(),
            diff_out: config.output.diff_csv.clone(),
            tolerance: config.diff.tolerance,
            run_timeout: config.run.timeout(),
            max_concurrent_sources: config.run.max_concurrent_sources,
        }
    }

    fn diff_path(&self) -> PathBuf {
        self.diff_out.clone().unwrap_or_else(|| {
            let stem = self
                .csv_out
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "holdings".to_string());
            self.csv_out.with_file_name(format!("{stem}_diff.csv"))
        })
    }
}

/// Stored key line of the run report.
#[derive(Clone, Debug, Serialize)]
pub struct StoredSnapshot {
    pub key: String,
    pub inserted: usize,
    pub replaced: usize,
}

/// Diff line of the run report.
#[derive(Clone, Debug, Serialize)]
pub struct DiffSummary {
    pub before: String,
    pub after: String,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub report: String,
}

/// Machine-readable outcome of an ingest run, printed as JSON on stdout.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub summary: RunSummary,
    pub store_failures: usize,
    pub sources: Vec<SourceReport>,
    pub warnings: Vec<RunWarning>,
    pub stored: Vec<StoredSnapshot>,
    pub artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_error: Option<String>,
}

impl RunReport {
    fn new(context: &RunContext) -> Self {
        Self {
            run_id: context.run_id,
            started_at: context.started_at,
            finished_at: context.finished_at,
            summary: context.summary(),
            store_failures: 0,
            sources: context.sources.clone(),
            warnings: context.warnings.clone(),
            stored: Vec::new(),
            artifacts: Vec::new(),
            diff: None,
            diff_error: None,
        }
    }

    /// True when every configured source failed or timed out.
    pub fn nothing_ingested(&self) -> bool {
        !self.sources.is_empty() && self.summary.sources_ok == 0
    }
}

/// Builds the HTTP fetcher described by the `[http]` and `[edgar]` sections.
pub fn http_fetcher(config: &AppConfig) -> Result<HttpFetcher> {
    let fetcher_config = HttpFetcherConfig {
        user_agent: config.http.user_agent.clone(),
        timeout: config.http.timeout(),
        cache_dir: config.http.cache_dir.clone(),
        edgar_requests_per_second: config.http.edgar_requests_per_second,
        edgar_data_base_url: config.edgar.data_base_url.clone(),
        edgar_archives_base_url: config.edgar.archives_base_url.clone(),
    };
    HttpFetcher::new(fetcher_config).context("failed to build http client")
}

/// Runs every configured source, then stores, writes and diffs the result.
///
/// Source, store and diff failures end up in the report; only artifact and database I/O
/// errors abort the run.
pub async fn run_ingest(
    config: &AppConfig,
    fetcher: Arc<dyn SourceFetcher>,
    options: &PipelineOptions,
) -> Result<RunReport> {
    let ingestor = Ingestor::new(
        fetcher,
        IngestOptions {
            max_concurrent_sources: options.max_concurrent_sources,
            timeout: options.run_timeout,
            fund_aliases: config.fund_aliases.clone(),
        },
    );
    let mut context = ingestor.run(&config.sources).await;
    let partitions = context.partitions();

    let store = match &options.database {
        Some(path) => Some(open_store(path.clone(), options.append_policy).await?),
        None => None,
    };
    let mut stored = Vec::new();
    let mut store_failures = 0;
    if let Some(store) = &store {
        let (appended, failures) = append_partitions(store.clone(), partitions.clone()).await?;
        stored = appended;
        store_failures = failures.len();
        for warning in failures {
            context.warn(warning);
        }
    }

    let mut report = RunReport::new(&context);
    report.stored = stored;
    report.store_failures = store_failures;

    write_csv(&options.csv_out, &context.records)
        .with_context(|| format!("failed to write {}", options.csv_out.display()))?;
    report.artifacts.push(options.csv_out.display().to_string());
    if let Some(json) = &options.json_out {
        write_json(json, &context.records)
            .with_context(|| format!("failed to write {}", json.display()))?;
        report.artifacts.push(json.display().to_string());
    }

    if let Some(previous) = &options.previous {
        let label = format!("run {}", context.run_id);
        let outcome = diff_against(
            previous,
            store.as_ref(),
            &partitions,
            label,
            &context.records,
            options,
        );
        match outcome {
            Ok(summary) => report.diff = Some(summary),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(previous = %previous, error = %message, "diff step failed");
                report.warnings.push(RunWarning::new(
                    "diff",
                    WarningStage::Diff,
                    message.clone(),
                ));
                report.diff_error = Some(message);
            }
        }
    }

    info!(
        run_id = %report.run_id,
        sources_ok = report.summary.sources_ok,
        sources_failed = report.summary.sources_failed,
        rows_emitted = report.summary.rows_emitted,
        rows_dropped = report.summary.rows_dropped,
        warnings = report.warnings.len(),
        "ingest run finished"
    );
    Ok(report)
}

async fn open_store(path: PathBuf, policy: AppendPolicy) -> Result<SqliteSnapshotStore> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || SqliteSnapshotStore::new(path))
        .await
        .context("store task failed")?
        .map(|store| store.with_policy(policy))
        .with_context(|| format!("failed to open snapshot database {display}"))
}

/// Appends each (fund, date) partition in its own transaction, one after another.
async fn append_partitions(
    store: SqliteSnapshotStore,
    partitions: BTreeMap<SnapshotKey, Vec<HoldingRecord>>,
) -> Result<(Vec<StoredSnapshot>, Vec<RunWarning>)> {
    tokio::task::spawn_blocking(move || {
        let mut stored = Vec::new();
        let mut failures = Vec::new();
        for (key, records) in &partitions {
            match store.append_snapshot(key, records) {
                Ok(outcome) => stored.push(StoredSnapshot {
                    key: outcome.key.to_string(),
                    inserted: outcome.inserted,
                    replaced: outcome.replaced,
                }),
                Err(err) => {
                    if !matches!(err, StoreError::Conflict { .. }) {
                        warn!(key = %key, error = %err, "failed to store snapshot");
                    }
                    failures.push(
                        RunWarning::new(key.fund_ticker.clone(), WarningStage::Store, err.to_string())
                            .at(key.to_string()),
                    );
                }
            }
        }
        (stored, failures)
    })
    .await
    .context("store task failed")
}

fn diff_against(
    previous: &str,
    store: Option<&SqliteSnapshotStore>,
    partitions: &BTreeMap<SnapshotKey, Vec<HoldingRecord>>,
    label: String,
    records: &[HoldingRecord],
    options: &PipelineOptions,
) -> Result<DiffSummary> {
    let (before, after) = if previous.eq_ignore_ascii_case(PREVIOUS_LATEST) {
        let (before, matched) = latest_snapshots(store, partitions)?;
        let records = matched
            .iter()
            .filter_map(|key| partitions.get(key))
            .flatten()
            .cloned()
            .collect();
        (before, Snapshot::new(label, records))
    } else {
        let reference = SnapshotRef::parse(previous)?;
        let before = reference.load(store.map(|store| store as &dyn SnapshotRepository))?;
        (before, Snapshot::new(label, records.to_vec()))
    };
    let diff = SnapshotDiffer::new(options.tolerance).diff(&before, &after);
    let path = options.diff_path();
    write_diff_csv(&path, &diff)?;
    Ok(DiffSummary {
        before: diff.before.clone(),
        after: diff.after.clone(),
        added: diff.count(DiffKind::Added),
        removed: diff.count(DiffKind::Removed),
        changed: diff.count(DiffKind::Changed),
        report: path.display().to_string(),
    })
}

/// Combines, for every key of the run, the most recent stored snapshot of that fund before it.
/// Also returns the run keys that found one; keys without history take no part in the diff.
fn latest_snapshots(
    store: Option<&SqliteSnapshotStore>,
    partitions: &BTreeMap<SnapshotKey, Vec<HoldingRecord>>,
) -> Result<(Snapshot, Vec<SnapshotKey>)> {
    let store = store.ok_or_else(|| anyhow!("previous = \"latest\" needs the snapshot database"))?;
    let mut labels = Vec::new();
    let mut records = Vec::new();
    let mut matched = Vec::new();
    for key in partitions.keys() {
        let Some(previous) = store.latest_before(&key.fund_ticker, key.as_of_date)? else {
            continue;
        };
        matched.push(key.clone());
        if labels.contains(&previous.to_string()) {
            continue;
        }
        records.extend(store.load(&previous)?.into_records());
        labels.push(previous.to_string());
    }
    if labels.is_empty() {
        return Err(anyhow!("no earlier snapshot stored for the funds in this run"));
    }
    Ok((Snapshot::new(labels.join("+"), records), matched))
}
