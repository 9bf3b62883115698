//! Typed settings for Holdwatch runs, loaded from TOML with `HOLDWATCH__*` overrides.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use config::{Config, Environment, File, FileFormat};
use holdwatch_core::SourceConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// File consulted when no explicit configuration path is supplied.
pub const DEFAULT_CONFIG_FILE: &str = "holdwatch.toml";
/// Prefix of environment variables overriding file values (`HOLDWATCH__RUN__TIMEOUT_SECS`).
pub const ENV_PREFIX: &str = "HOLDWATCH";

/// Root configuration object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub edgar: EdgarConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    /// Vendor fund names mapped onto canonical fund tickers.
    #[serde(default)]
    pub fund_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// SEC fair-access rules require a contact string here.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_edgar_rps")]
    pub edgar_requests_per_second: u32,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_http_timeout_secs(),
            cache_dir: None,
            edgar_requests_per_second: default_edgar_rps(),
        }
    }
}

fn default_user_agent() -> String {
    format!("holdwatch/{} (contact@example.com)", env!("CARGO_PKG_VERSION"))
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_edgar_rps() -> u32 {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgarConfig {
    #[serde(default = "default_data_base_url")]
    pub data_base_url: String,
    #[serde(default = "default_archives_base_url")]
    pub archives_base_url: String,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            data_base_url: default_data_base_url(),
            archives_base_url: default_archives_base_url(),
        }
    }
}

fn default_data_base_url() -> String {
    "https://data.sec.gov".to_string()
}

fn default_archives_base_url() -> String {
    "https://www.sec.gov".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_run_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_run_timeout_secs(),
            max_concurrent_sources: default_max_concurrent_sources(),
        }
    }
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent_sources() -> usize {
    4
}

/// What to do when a snapshot key is written twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendPolicySetting {
    #[default]
    Replace,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default)]
    pub append_policy: AppendPolicySetting,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            append_policy: AppendPolicySetting::default(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("data/holdings.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_csv")]
    pub csv: PathBuf,
    #[serde(default = "default_output_json")]
    pub json: Option<PathBuf>,
    /// Destination of the diff report; defaults next to the CSV artifact.
    #[serde(default)]
    pub diff_csv: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv: default_output_csv(),
            json: default_output_json(),
            diff_csv: None,
        }
    }
}

fn default_output_csv() -> PathBuf {
    PathBuf::from("data/holdings_latest.csv")
}

fn default_output_json() -> Option<PathBuf> {
    Some(PathBuf::from("data/holdings_latest.json"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Absolute delta below which numeric fields are considered unchanged.
    #[serde(default)]
    pub tolerance: Decimal,
    /// Snapshot reference compared against each run.
    #[serde(default)]
    pub previous: Option<String>,
}

impl AppConfig {
    /// Canonical fund ticker for a vendor-supplied fund label.
    pub fn resolve_fund_alias(&self, label: &str) -> Option<String> {
        let needle = label.trim();
        self.fund_aliases
            .iter()
            .find(|(alias, _)| alias.trim().eq_ignore_ascii_case(needle))
            .map(|(_, ticker)| ticker.trim().to_ascii_uppercase())
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.run.max_concurrent_sources == 0 {
            bail!("run.max_concurrent_sources must be at least 1");
        }
        if self.http.edgar_requests_per_second == 0 {
            bail!("http.edgar_requests_per_second must be at least 1");
        }
        if self.diff.tolerance.is_sign_negative() {
            bail!("diff.tolerance must not be negative");
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id().trim().is_empty() {
                bail!("every source needs a non-empty id");
            }
            if !seen.insert(source.id().to_string()) {
                bail!("duplicate source id '{}'", source.id());
            }
            let column_map = match source {
                SourceConfig::CsvUrl(csv) => Some(&csv.column_map),
                SourceConfig::HtmlTable(html) => Some(&html.column_map),
                SourceConfig::EdgarCik(edgar) => {
                    if !edgar.cik.chars().any(|c| c.is_ascii_digit()) {
                        bail!("source '{}' has an invalid cik '{}'", edgar.id, edgar.cik);
                    }
                    None
                }
            };
            if let Some(map) = column_map {
                map.resolve()
                    .map_err(|err| anyhow!("source '{}': {err}", source.id()))?;
            }
        }
        Ok(())
    }
}

/// Loads configuration from `path` (or [`DEFAULT_CONFIG_FILE`] when present), then applies
/// `HOLDWATCH__SECTION__KEY` environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder();
    match path {
        Some(path) => {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        None => {
            builder = builder.add_source(
                File::with_name(DEFAULT_CONFIG_FILE)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    let settings = builder.build().with_context(|| match path {
        Some(path) => format!("failed to read config {}", path.display()),
        None => "failed to assemble configuration".to_string(),
    })?;
    let config: AppConfig = settings
        .try_deserialize()
        .context("invalid configuration")?;
    config.validate()?;
    Ok(config)
}
