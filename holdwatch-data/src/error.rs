use thiserror::Error;

/// Failure retrieving the raw document for one source. Never aborts other sources.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} responded with status {status}: {snippet}")]
    Status {
        url: String,
        status: u16,
        snippet: String,
    },
    #[error("no 13F-HR filing found for CIK {cik}")]
    NoFiling { cik: String },
    #[error("filing {accession} has no information table document")]
    MissingDocument { accession: String },
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
    #[error("invalid source configuration: {0}")]
    InvalidSource(String),
    #[error("failed to build http client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether retrying the same request later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            FetchError::NoFiling { .. }
            | FetchError::MissingDocument { .. }
            | FetchError::InvalidResponse { .. }
            | FetchError::InvalidSource(_)
            | FetchError::Client(_) => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Structurally broken document. Aborts the affected source only.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no header row found among the first {scanned} lines")]
    MissingHeader { scanned: usize },
    #[error("csv error: {0}")]
    Csv(String),
    #[error("xml error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("document contains no 13F information table")]
    NoInformationTable,
    #[error("no table matched selector '{0}'")]
    TableNotFound(String),
    #[error("invalid css selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

impl From<csv::Error> for ParseError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value.to_string())
    }
}

/// Single unusable table row, recovered as a run warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row {line} has no shares, weight or market value")]
    Empty { line: usize },
    #[error("row {line} is malformed: {message}")]
    Malformed { line: usize, message: String },
}

impl RowError {
    pub fn line(&self) -> usize {
        match self {
            RowError::Empty { line } | RowError::Malformed { line, .. } => *line,
        }
    }
}

/// Row lacking identity fields required by the canonical schema; dropped with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("fund ticker could not be resolved")]
    MissingFundTicker,
    #[error("as-of date could not be resolved")]
    MissingAsOfDate,
    #[error("row has no ticker, cusip, isin, sedol or name")]
    MissingIdentifier,
}
