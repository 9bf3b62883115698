//! Retrieval of raw source documents over HTTP.

mod cache;
mod edgar;
mod limiter;

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use holdwatch_core::{EdgarSource, SourceConfig};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, warn};

pub use cache::ResponseCache;
pub use edgar::FilingMeta;
pub use limiter::RateLimiter;

use crate::error::FetchError;
use edgar::{choose_document, filing_dir_url, select_filing, submissions_url, FilingIndex, Submissions};

const DEFAULT_DATA_BASE_URL: &str = "https://data.sec.gov";
const DEFAULT_ARCHIVES_BASE_URL: &str = "https://www.sec.gov";

/// Raw bytes of one source document.
#[derive(Clone, Debug)]
pub struct FetchedDocument {
    pub url: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    /// Present for EDGAR sources.
    pub filing: Option<FilingMeta>,
}

impl FetchedDocument {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Retrieves the raw document for a configured source. Implementations never retry.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &SourceConfig) -> Result<FetchedDocument, FetchError>;
}

/// Settings for [`HttpFetcher`].
#[derive(Clone, Debug)]
pub struct HttpFetcherConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub cache_dir: Option<PathBuf>,
    pub edgar_requests_per_second: u32,
    pub edgar_data_base_url: String,
    pub edgar_archives_base_url: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("holdwatch/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
            cache_dir: None,
            edgar_requests_per_second: 8,
            edgar_data_base_url: DEFAULT_DATA_BASE_URL.to_string(),
            edgar_archives_base_url: DEFAULT_ARCHIVES_BASE_URL.to_string(),
        }
    }
}

impl HttpFetcherConfig {
    /// Points both EDGAR hosts at one base URL.
    #[must_use]
    pub fn with_edgar_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.edgar_data_base_url = base_url.clone();
        self.edgar_archives_base_url = base_url;
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `reqwest`-backed fetcher sharing one client across sources. EDGAR requests are throttled.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
    edgar_limiter: RateLimiter,
    cache: Option<ResponseCache>,
}

impl HttpFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .gzip(true)
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        let cache = config.cache_dir.clone().map(ResponseCache::new);
        Ok(Self {
            client,
            edgar_limiter: RateLimiter::per_second(config.edgar_requests_per_second),
            cache,
            config,
        })
    }

    async fn get(&self, url: &str, throttled: bool) -> Result<(Vec<u8>, Option<String>), FetchError> {
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.get(url).await {
                debug!(%url, bytes = body.len(), "http cache hit");
                return Ok((body, None));
            }
        }
        if throttled {
            self.edgar_limiter.until_ready().await;
        }
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::from_reqwest(url, err))?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::from_reqwest(url, err))?
            .to_vec();
        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            debug!(%url, status = status.as_u16(), body = %truncate(&text, 512), "request rejected");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                snippet: truncate(&text, 256),
            });
        }
        debug!(
            %url,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched document"
        );
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(url, &body).await {
                warn!(%url, dir = %cache.dir().display(), error = %err, "failed to cache response");
            }
        }
        Ok((body, content_type))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let (body, _) = self.get(url, true).await?;
        serde_json::from_slice(&body).map_err(|err| FetchError::InvalidResponse {
            url: url.to_string(),
            message: err.to_string(),
        })
    }

    async fn fetch_edgar(&self, source: &EdgarSource) -> Result<FetchedDocument, FetchError> {
        let digits = source.cik_digits();
        if digits.is_empty() {
            return Err(FetchError::InvalidSource(format!(
                "source '{}' has no usable CIK",
                source.id
            )));
        }
        let listing_url = submissions_url(&self.config.edgar_data_base_url, &source.cik_padded());
        let submissions: Submissions = self.get_json(&listing_url).await?;
        let filing = select_filing(&submissions.filings.recent, source.before)
            .ok_or_else(|| FetchError::NoFiling { cik: digits.clone() })?;

        let dir_url = filing_dir_url(
            &self.config.edgar_archives_base_url,
            &digits,
            &filing.accession_number,
        );
        let index: FilingIndex = self.get_json(&format!("{dir_url}/index.json")).await?;
        let document = choose_document(&index.directory.item, &filing.accession_number)
            .ok_or_else(|| FetchError::MissingDocument {
                accession: filing.accession_number.clone(),
            })?;

        let url = format!("{dir_url}/{document}");
        let (body, content_type) = self.get(&url, true).await?;
        let meta = filing.into_meta(&digits, document);
        info!(
            source = %source.id,
            cik = %meta.cik,
            accession = %meta.accession_number,
            form = %meta.form,
            document = %meta.document,
            "resolved 13F filing"
        );
        Ok(FetchedDocument {
            url,
            body,
            content_type,
            filing: Some(meta),
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &SourceConfig) -> Result<FetchedDocument, FetchError> {
        match source {
            SourceConfig::CsvUrl(csv) => self.fetch_url(&csv.url).await,
            SourceConfig::HtmlTable(html) => self.fetch_url(&html.url).await,
            SourceConfig::EdgarCik(edgar) => self.fetch_edgar(edgar).await,
        }
    }
}

impl HttpFetcher {
    async fn fetch_url(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let (body, content_type) = self.get(url, false).await?;
        Ok(FetchedDocument {
            url: url.to_string(),
            body,
            content_type,
            filing: None,
        })
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_core::{CsvSource, EdgarSource, FilingFormatHint, ValueUnit};
    use holdwatch_test_utils::fixtures::{
        filing_index_json, submissions_json, tci_info_table, FilingStub,
    };
    use holdwatch_test_utils::{MockHttpServer, MockRoute};
    use tempfile::tempdir;

    const TCI_CIK: &str = "0001647251";

    fn csv_source(url: String) -> SourceConfig {
        SourceConfig::CsvUrl(CsvSource {
            id: "arkk".into(),
            url,
            fund_ticker: Some("ARKK".into()),
            as_of: None,
            weight_scale: Default::default(),
            column_map: Default::default(),
        })
    }

    fn edgar_source(before: Option<chrono::NaiveDate>) -> SourceConfig {
        SourceConfig::EdgarCik(EdgarSource {
            id: "tci".into(),
            cik: TCI_CIK.into(),
            fund_ticker: Some("TCI".into()),
            before,
            filing_format: FilingFormatHint::Auto,
            value_unit: ValueUnit::Thousands,
        })
    }

    fn fetcher(server: &MockHttpServer) -> HttpFetcher {
        let config = HttpFetcherConfig {
            user_agent: "holdwatch-tests (qa@example.com)".into(),
            edgar_requests_per_second: 100,
            ..HttpFetcherConfig::default()
        }
        .with_edgar_base_url(server.base_url());
        HttpFetcher::new(config).unwrap()
    }

    #[tokio::test]
    async fn fetches_csv_with_user_agent() {
        let server = MockHttpServer::start().await.unwrap();
        server.route("/arkk.csv", MockRoute::ok("ticker,name\n").with_content_type("text/csv"));
        let doc = fetcher(&server)
            .fetch(&csv_source(server.url("/arkk.csv")))
            .await
            .unwrap();
        assert_eq!(doc.text(), "ticker,name\n");
        assert_eq!(doc.content_type.as_deref(), Some("text/csv"));
        assert!(doc.filing.is_none());
        let requests = server.requests();
        assert_eq!(
            requests[0].user_agent.as_deref(),
            Some("holdwatch-tests (qa@example.com)")
        );
    }

    #[tokio::test]
    async fn classifies_http_failures() {
        let server = MockHttpServer::start().await.unwrap();
        server.route("/down.csv", MockRoute::status(503));
        let fetcher = fetcher(&server);

        let missing = fetcher
            .fetch(&csv_source(server.url("/missing.csv")))
            .await
            .unwrap_err();
        assert!(matches!(missing, FetchError::Status { status: 404, .. }));
        assert!(!missing.is_transient());

        let down = fetcher
            .fetch(&csv_source(server.url("/down.csv")))
            .await
            .unwrap_err();
        assert!(down.is_transient());
    }

    #[tokio::test]
    async fn request_timeout_is_transient() {
        let server = MockHttpServer::start().await.unwrap();
        server.route(
            "/slow.csv",
            MockRoute::ok("ticker\n").with_delay(Duration::from_secs(2)),
        );
        let config = HttpFetcherConfig::default().with_timeout(Duration::from_millis(100));
        let err = HttpFetcher::new(config)
            .unwrap()
            .fetch(&csv_source(server.url("/slow.csv")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "{err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let server = MockHttpServer::start().await.unwrap();
        server.route("/arkk.csv", MockRoute::ok("ticker,name\n"));
        let dir = tempdir().unwrap();
        let config = HttpFetcherConfig::default().with_cache_dir(dir.path());
        let fetcher = HttpFetcher::new(config).unwrap();
        let source = csv_source(server.url("/arkk.csv"));

        fetcher.fetch(&source).await.unwrap();
        let cached = fetcher.fetch(&source).await.unwrap();
        assert_eq!(cached.body, b"ticker,name\n");
        assert_eq!(server.hits("/arkk.csv"), 1);
    }

    fn serve_tci(server: &MockHttpServer) {
        let filings = [
            FilingStub::new("0001647251-25-000004", "13F-HR", "2025-06-30", "2025-08-14"),
            FilingStub::new("0001647251-25-000002", "13F-HR", "2025-03-31", "2025-05-15"),
        ];
        server.route(
            "/submissions/CIK0001647251.json",
            MockRoute::json(submissions_json(TCI_CIK, "TCI FUND MANAGEMENT LTD", &filings)),
        );
        for (stub, document) in [(&filings[0], "infotable.xml"), (&filings[1], "46994.xml")] {
            let dir = format!(
                "/Archives/edgar/data/1647251/{}",
                stub.accession_no_dashes()
            );
            server.route(
                format!("{dir}/index.json"),
                MockRoute::json(filing_index_json(&dir, &["primary_doc.xml", document])),
            );
            server.route(
                format!("{dir}/{document}"),
                MockRoute::ok(tci_info_table()).with_content_type("text/xml"),
            );
        }
    }

    #[tokio::test]
    async fn resolves_latest_filing_document() {
        let server = MockHttpServer::start().await.unwrap();
        serve_tci(&server);
        let doc = fetcher(&server).fetch(&edgar_source(None)).await.unwrap();
        assert!(doc.text().contains("informationTable"));
        assert!(doc.url.ends_with("/000164725125000004/infotable.xml"));
        let meta = doc.filing.unwrap();
        assert_eq!(meta.accession_number, "0001647251-25-000004");
        assert_eq!(meta.cik, "1647251");
        assert_eq!(meta.document, "infotable.xml");
        assert_eq!(meta.report_date, chrono::NaiveDate::from_ymd_opt(2025, 6, 30));
    }

    #[tokio::test]
    async fn honours_report_date_bound() {
        let server = MockHttpServer::start().await.unwrap();
        serve_tci(&server);
        let bound = chrono::NaiveDate::from_ymd_opt(2025, 4, 30);
        let doc = fetcher(&server).fetch(&edgar_source(bound)).await.unwrap();
        let meta = doc.filing.unwrap();
        assert_eq!(meta.accession_number, "0001647251-25-000002");
        assert_eq!(meta.document, "46994.xml");
    }

    #[tokio::test]
    async fn unknown_cik_and_missing_filings_are_permanent() {
        let server = MockHttpServer::start().await.unwrap();
        let fetcher = fetcher(&server);
        let err = fetcher.fetch(&edgar_source(None)).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(!err.is_transient());

        server.route(
            "/submissions/CIK0001647251.json",
            MockRoute::json(submissions_json(
                TCI_CIK,
                "TCI FUND MANAGEMENT LTD",
                &[FilingStub::new("0001647251-25-000001", "SC 13G", "", "2025-02-14")],
            )),
        );
        let err = fetcher.fetch(&edgar_source(None)).await.unwrap_err();
        assert!(matches!(err, FetchError::NoFiling { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("äöü", 5), "äöü");
    }
}
