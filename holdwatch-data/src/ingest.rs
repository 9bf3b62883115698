//! Concurrent fetch, parse and normalize over every configured source.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use holdwatch_core::{HoldingRecord, RunWarning, SnapshotKey, SourceConfig, WarningStage};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FetchError, ParseError};
use crate::fetch::{FetchedDocument, SourceFetcher};
use crate::normalize::{Normalizer, SourceContext};
use crate::parser::csv::CsvHoldingsParser;
use crate::parser::filing::parser_for;
use crate::parser::html::HtmlTableParser;
use crate::parser::{ParseWarning, RawRow};

/// Final state of one source within a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Succeeded,
    Failed {
        stage: WarningStage,
        message: String,
        transient: bool,
    },
    TimedOut,
}

/// Per-source line of the run report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub kind: &'static str,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub rows_emitted: usize,
    pub rows_dropped: usize,
}

/// Aggregate counters of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub rows_emitted: usize,
    pub rows_dropped: usize,
}

/// Accumulator for one ingest run: records and warnings in source-declaration order.
#[derive(Clone, Debug, Serialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub records: Vec<HoldingRecord>,
    pub warnings: Vec<RunWarning>,
    pub sources: Vec<SourceReport>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::new(),
            warnings: Vec::new(),
            sources: Vec::new(),
        }
    }

    pub fn warn(&mut self, warning: RunWarning) {
        self.warnings.push(warning);
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for report in &self.sources {
            if report.status == SourceStatus::Succeeded {
                summary.sources_ok += 1;
            } else {
                summary.sources_failed += 1;
            }
            summary.rows_emitted += report.rows_emitted;
            summary.rows_dropped += report.rows_dropped;
        }
        summary
    }

    /// Records grouped by storage key, each group in canonical record order.
    pub fn partitions(&self) -> BTreeMap<SnapshotKey, Vec<HoldingRecord>> {
        let mut partitions: BTreeMap<SnapshotKey, Vec<HoldingRecord>> = BTreeMap::new();
        for record in &self.records {
            partitions
                .entry(SnapshotKey::of(record))
                .or_default()
                .push(record.clone());
        }
        for records in partitions.values_mut() {
            records.sort();
        }
        partitions
    }

    /// Records one source; a missing outcome means the source was still running at the timeout.
    fn absorb(&mut self, source: &SourceConfig, outcome: Option<SourceOutcome>) {
        let Some(outcome) = outcome else {
            self.sources.push(SourceReport {
                source_id: source.id().to_string(),
                kind: source.kind(),
                status: SourceStatus::TimedOut,
                rows_emitted: 0,
                rows_dropped: 0,
            });
            self.warn(RunWarning::new(
                source.id(),
                WarningStage::Fetch,
                "source did not finish before the run timeout",
            ));
            return;
        };
        let rows_emitted = outcome.records.len();
        self.records.extend(outcome.records);
        self.warnings.extend(outcome.warnings);
        self.sources.push(SourceReport {
            source_id: source.id().to_string(),
            kind: source.kind(),
            status: outcome.status,
            rows_emitted,
            rows_dropped: outcome.rows_dropped,
        });
    }
}

/// Run-wide knobs for [`Ingestor`].
#[derive(Clone, Debug)]
pub struct IngestOptions {
    pub max_concurrent_sources: usize,
    pub timeout: Duration,
    pub fund_aliases: BTreeMap<String, String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 4,
            timeout: Duration::from_secs(300),
            fund_aliases: BTreeMap::new(),
        }
    }
}

/// Runs every source as an independent task and merges the results deterministically.
pub struct Ingestor {
    fetcher: Arc<dyn SourceFetcher>,
    options: IngestOptions,
}

struct SourceOutcome {
    index: usize,
    records: Vec<HoldingRecord>,
    warnings: Vec<RunWarning>,
    rows_dropped: usize,
    status: SourceStatus,
}

impl SourceOutcome {
    fn panicked(index: usize, source_id: &str) -> Self {
        let message = "source task panicked".to_string();
        Self {
            index,
            records: Vec::new(),
            warnings: vec![RunWarning::new(source_id, WarningStage::Fetch, message.clone())],
            rows_dropped: 0,
            status: SourceStatus::Failed {
                stage: WarningStage::Fetch,
                message,
                transient: false,
            },
        }
    }
}

/// Aborts the wrapped task when dropped, so a timed-out run does not leave it running.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct SourceFailure {
    stage: WarningStage,
    message: String,
    transient: bool,
}

impl From<FetchError> for SourceFailure {
    fn from(err: FetchError) -> Self {
        Self {
            stage: WarningStage::Fetch,
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

impl From<ParseError> for SourceFailure {
    fn from(err: ParseError) -> Self {
        Self {
            stage: WarningStage::Parse,
            transient: false,
            message: err.to_string(),
        }
    }
}

impl Ingestor {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, options: IngestOptions) -> Self {
        Self { fetcher, options }
    }

    /// Fetches, parses and normalizes every source. Never fails as a whole: per-source
    /// problems end up in the returned context.
    pub async fn run(&self, sources: &[SourceConfig]) -> RunContext {
        let mut context = RunContext::new();
        let deadline = Instant::now() + self.options.timeout;
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_sources.max(1)));
        let aliases = Arc::new(self.options.fund_aliases.clone());
        info!(
            run_id = %context.run_id,
            sources = sources.len(),
            max_concurrent = self.options.max_concurrent_sources,
            "starting ingest run"
        );

        let mut tasks = JoinSet::new();
        for (index, source) in sources.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let aliases = aliases.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let id = source.id().to_string();
                let mut worker = AbortOnDrop(tokio::spawn(async move {
                    run_source(index, fetcher.as_ref(), &source, &aliases).await
                }));
                match (&mut worker.0).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        warn!(source = %id, error = %err, "source task panicked");
                        SourceOutcome::panicked(index, &id)
                    }
                }
            });
        }

        let mut outcomes: Vec<Option<SourceOutcome>> = sources.iter().map(|_| None).collect();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(outcome))) => {
                    let index = outcome.index;
                    outcomes[index] = Some(outcome);
                }
                Ok(Some(Err(err))) => warn!(error = %err, "source task aborted"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = tasks.len(),
                        timeout_secs = self.options.timeout.as_secs_f64(),
                        "run timeout reached; aborting outstanding sources"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        for (source, outcome) in sources.iter().zip(outcomes) {
            context.absorb(source, outcome);
        }
        context.finished_at = Some(Utc::now());
        let summary = context.summary();
        info!(
            run_id = %context.run_id,
            sources_ok = summary.sources_ok,
            sources_failed = summary.sources_failed,
            rows_emitted = summary.rows_emitted,
            rows_dropped = summary.rows_dropped,
            warnings = context.warnings.len(),
            "ingest run finished"
        );
        context
    }
}

async fn run_source(
    index: usize,
    fetcher: &dyn SourceFetcher,
    source: &SourceConfig,
    aliases: &BTreeMap<String, String>,
) -> SourceOutcome {
    let result = match fetcher.fetch(source).await {
        Ok(document) => process_document(source, &document, aliases),
        Err(err) => Err(SourceFailure::from(err)),
    };
    match result {
        Ok(processed) => {
            info!(
                source = %source.id(),
                kind = source.kind(),
                rows = processed.records.len(),
                dropped = processed.rows_dropped,
                "source ingested"
            );
            SourceOutcome {
                index,
                records: processed.records,
                warnings: processed.warnings,
                rows_dropped: processed.rows_dropped,
                status: SourceStatus::Succeeded,
            }
        }
        Err(failure) => {
            warn!(
                source = %source.id(),
                stage = %failure.stage,
                transient = failure.transient,
                error = %failure.message,
                "source failed"
            );
            SourceOutcome {
                index,
                records: Vec::new(),
                warnings: vec![RunWarning::new(source.id(), failure.stage, failure.message.clone())],
                rows_dropped: 0,
                status: SourceStatus::Failed {
                    stage: failure.stage,
                    message: failure.message,
                    transient: failure.transient,
                },
            }
        }
    }
}

#[derive(Default)]
struct Processed {
    records: Vec<HoldingRecord>,
    warnings: Vec<RunWarning>,
    rows_dropped: usize,
}

impl Processed {
    fn push(&mut self, source: &str, row: RawRow, context: &SourceContext) {
        let locator = row.locator();
        match Normalizer.normalize(&row, context) {
            Ok(normalized) => {
                for message in normalized.warnings {
                    self.warnings.push(
                        RunWarning::new(source, WarningStage::Normalize, message).at(locator.clone()),
                    );
                }
                self.records.push(normalized.record);
            }
            Err(err) => {
                self.rows_dropped += 1;
                self.warnings
                    .push(RunWarning::new(source, WarningStage::Normalize, err.to_string()).at(locator));
            }
        }
    }

    fn parse_warnings(&mut self, source: &str, warnings: Vec<ParseWarning>) {
        for warning in warnings {
            let mut run_warning = RunWarning::new(source, WarningStage::Parse, warning.message);
            run_warning.locator = warning.locator;
            self.warnings.push(run_warning);
        }
    }
}

fn process_document(
    source: &SourceConfig,
    document: &FetchedDocument,
    aliases: &BTreeMap<String, String>,
) -> Result<Processed, SourceFailure> {
    let id = source.id();
    let mut processed = Processed::default();
    let invalid = |message: String| SourceFailure {
        stage: WarningStage::Parse,
        message,
        transient: false,
    };
    match source {
        SourceConfig::CsvUrl(csv) => {
            let column_map = csv.column_map.resolve().map_err(invalid)?;
            let rows = CsvHoldingsParser::new(&column_map).parse(&document.body)?;
            let context = SourceContext::for_source(source)
                .with_document(rows.facts().clone())
                .with_fund_aliases(aliases);
            for row in rows {
                match row {
                    Ok(row) => processed.push(id, RawRow::Table(row), &context),
                    Err(err) => {
                        processed.rows_dropped += 1;
                        processed.warnings.push(
                            RunWarning::new(id, WarningStage::Row, err.to_string())
                                .at(format!("line {}", err.line())),
                        );
                    }
                }
            }
        }
        SourceConfig::HtmlTable(html) => {
            let column_map = html.column_map.resolve().map_err(invalid)?;
            let parser = HtmlTableParser::new(
                &column_map,
                html.table_selector.as_str(),
                html.as_of_selector.clone(),
            );
            let table = parser.parse(&document.text())?;
            let context = SourceContext::for_source(source)
                .with_document(table.facts)
                .with_fund_aliases(aliases);
            for row in table.rows {
                match row {
                    Ok(row) => processed.push(id, RawRow::Table(row), &context),
                    Err(err) => {
                        processed.rows_dropped += 1;
                        processed.warnings.push(
                            RunWarning::new(id, WarningStage::Row, err.to_string())
                                .at(format!("row {}", err.line())),
                        );
                    }
                }
            }
        }
        SourceConfig::EdgarCik(edgar) => {
            let parser = parser_for(edgar.filing_format, &document.body, edgar.value_unit);
            let filing = parser.parse(&document.body)?;
            let report_date = document
                .filing
                .as_ref()
                .and_then(|meta| meta.report_date)
                .or(filing.report_date);
            let mut context = SourceContext::for_source(source)
                .with_report_date(report_date)
                .with_filing_total(filing.total_value())
                .with_fund_aliases(aliases)
                .with_extra("filing_format", parser.format().to_string());
            if let Some(meta) = &document.filing {
                context = context
                    .with_extra("accession_number", meta.accession_number.clone())
                    .with_extra("form", meta.form.clone());
            }
            processed.rows_dropped += filing.skipped;
            processed.parse_warnings(id, filing.warnings);
            for position in filing.positions {
                processed.push(id, RawRow::Filing(position), &context);
            }
        }
    }
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use holdwatch_core::{CsvSource, EdgarSource, FilingFormatHint, ValueUnit};
    use holdwatch_test_utils::date;
    use holdwatch_test_utils::fixtures::{tci_info_table, ARK_CSV, PREAMBLE_CSV};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    use crate::fetch::FilingMeta;

    enum Canned {
        Body(&'static str, Option<FilingMeta>, Duration),
        Owned(String, Option<FilingMeta>),
        Status(u16),
        Panic,
    }

    #[derive(Default)]
    struct CannedFetcher {
        responses: HashMap<String, Canned>,
    }

    impl CannedFetcher {
        fn with(mut self, id: &str, canned: Canned) -> Self {
            self.responses.insert(id.to_string(), canned);
            self
        }
    }

    #[async_trait]
    impl SourceFetcher for CannedFetcher {
        async fn fetch(&self, source: &SourceConfig) -> Result<FetchedDocument, FetchError> {
            let url = format!("memory://{}", source.id());
            let (body, filing) = match self.responses.get(source.id()) {
                Some(Canned::Body(body, filing, delay)) => {
                    tokio::time::sleep(*delay).await;
                    (body.as_bytes().to_vec(), filing.clone())
                }
                Some(Canned::Owned(body, filing)) => (body.as_bytes().to_vec(), filing.clone()),
                Some(Canned::Panic) => panic!("fetcher blew up for {}", source.id()),
                Some(Canned::Status(status)) => {
                    return Err(FetchError::Status {
                        url,
                        status: *status,
                        snippet: String::new(),
                    })
                }
                None => {
                    return Err(FetchError::Status {
                        url,
                        status: 404,
                        snippet: String::new(),
                    })
                }
            };
            Ok(FetchedDocument {
                url,
                body,
                content_type: None,
                filing,
            })
        }
    }

    fn csv(id: &str, fund: Option<&str>) -> SourceConfig {
        SourceConfig::CsvUrl(CsvSource {
            id: id.into(),
            url: format!("https://example.com/{id}.csv"),
            fund_ticker: fund.map(str::to_string),
            as_of: None,
            weight_scale: Default::default(),
            column_map: Default::default(),
        })
    }

    fn ingestor(fetcher: CannedFetcher, timeout: Duration) -> Ingestor {
        Ingestor::new(
            Arc::new(fetcher),
            IngestOptions {
                max_concurrent_sources: 2,
                timeout,
                fund_aliases: BTreeMap::new(),
            },
        )
    }

    #[tokio::test]
    async fn failing_source_does_not_abort_others() {
        let fetcher = CannedFetcher::default()
            .with("arkk", Canned::Body(ARK_CSV, None, Duration::ZERO))
            .with("down", Canned::Status(503));
        let run = ingestor(fetcher, Duration::from_secs(5))
            .run(&[csv("down", None), csv("arkk", None)])
            .await;

        assert_eq!(run.records.len(), 3);
        assert!(run.records.iter().all(|r| r.fund_ticker == "ARKK"));
        assert!(matches!(
            run.sources[0].status,
            SourceStatus::Failed { stage: WarningStage::Fetch, transient: true, .. }
        ));
        assert_eq!(run.sources[1].status, SourceStatus::Succeeded);
        let summary = run.summary();
        assert_eq!(summary.sources_ok, 1);
        assert_eq!(summary.sources_failed, 1);
        assert_eq!(summary.rows_emitted, 3);
        assert_eq!(summary.rows_dropped, 1);
        assert!(run
            .warnings
            .iter()
            .any(|w| w.stage == WarningStage::Row && w.locator.as_deref() == Some("line 5")));
    }

    #[tokio::test]
    async fn timeout_keeps_completed_sources() {
        let fetcher = CannedFetcher::default()
            .with("slow", Canned::Body(ARK_CSV, None, Duration::from_secs(30)))
            .with("ives", Canned::Body(PREAMBLE_CSV, None, Duration::ZERO));
        let run = ingestor(fetcher, Duration::from_millis(300))
            .run(&[csv("slow", None), csv("ives", None)])
            .await;

        assert_eq!(run.sources[0].status, SourceStatus::TimedOut);
        assert_eq!(run.sources[1].status, SourceStatus::Succeeded);
        assert_eq!(run.records.len(), 3);
        let apple = &run.records[0];
        assert_eq!(apple.fund_ticker, "IVES");
        assert_eq!(apple.ticker.as_deref(), Some("AAPL"));
        assert_eq!(apple.weight_pct, Some(dec!(5.12)));
        assert_eq!(apple.market_value_usd, Some(dec!(1234000)));
        assert_eq!(apple.as_of_date, date("2025-09-24"));
    }

    #[tokio::test]
    async fn panicked_source_is_failed_even_when_the_run_times_out() {
        let fetcher = CannedFetcher::default()
            .with("boom", Canned::Panic)
            .with("slow", Canned::Body(ARK_CSV, None, Duration::from_secs(30)))
            .with("ives", Canned::Body(PREAMBLE_CSV, None, Duration::ZERO));
        let run = ingestor(fetcher, Duration::from_millis(300))
            .run(&[csv("boom", None), csv("slow", None), csv("ives", None)])
            .await;

        assert!(matches!(
            &run.sources[0].status,
            SourceStatus::Failed { stage: WarningStage::Fetch, transient: false, message }
                if message.contains("panicked")
        ));
        assert_eq!(run.sources[1].status, SourceStatus::TimedOut);
        assert_eq!(run.sources[2].status, SourceStatus::Succeeded);
        assert_eq!(run.summary().sources_failed, 2);
        assert_eq!(run.records.len(), 3);
    }

    #[tokio::test]
    async fn merges_in_declaration_order() {
        let fetcher = CannedFetcher::default()
            .with("first", Canned::Body(ARK_CSV, None, Duration::from_millis(150)))
            .with("second", Canned::Body(PREAMBLE_CSV, None, Duration::ZERO));
        let run = ingestor(fetcher, Duration::from_secs(5))
            .run(&[csv("first", None), csv("second", Some("ives"))])
            .await;
        let funds: Vec<&str> = run.records.iter().map(|r| r.fund_ticker.as_str()).collect();
        assert_eq!(funds, vec!["ARKK", "ARKK", "ARKK", "IVES", "IVES", "IVES"]);
        assert_eq!(run.sources[0].source_id, "first");
    }

    #[tokio::test]
    async fn edgar_positions_get_weights_and_filing_extras() {
        let meta = FilingMeta {
            cik: "1647251".into(),
            accession_number: "0001647251-25-000004".into(),
            form: "13F-HR".into(),
            report_date: Some(date("2025-06-30")),
            filing_date: Some(date("2025-08-14")),
            document: "infotable.xml".into(),
        };
        let fetcher =
            CannedFetcher::default().with("tci", Canned::Owned(tci_info_table(), Some(meta)));
        let source = SourceConfig::EdgarCik(EdgarSource {
            id: "tci".into(),
            cik: "0001647251".into(),
            fund_ticker: Some("TCI".into()),
            before: None,
            filing_format: FilingFormatHint::Auto,
            value_unit: ValueUnit::Thousands,
        });
        let run = ingestor(fetcher, Duration::from_secs(5)).run(&[source]).await;
        assert_eq!(run.records.len(), 3);
        let apple = &run.records[0];
        assert_eq!(apple.as_of_date, date("2025-06-30"));
        assert_eq!(apple.market_value_usd, Some(dec!(5000000)));
        assert_eq!(apple.weight_pct, Some(dec!(50)));
        assert_eq!(
            apple.extras.get("accession_number").map(String::as_str),
            Some("0001647251-25-000004")
        );
        assert_eq!(apple.extras.get("filing_format").map(String::as_str), Some("xml"));
        let partitions = run.partitions();
        assert_eq!(partitions.len(), 1);
        assert!(partitions.contains_key(&SnapshotKey::new("TCI", date("2025-06-30"))));
    }
}
