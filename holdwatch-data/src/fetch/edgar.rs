//! EDGAR submissions and filing-index payloads, and the rules picking the filing and the
//! information table document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const PRIMARY_DOCUMENT: &str = "primary_doc.xml";

/// Filing metadata carried alongside the fetched information table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingMeta {
    pub cik: String,
    pub accession_number: String,
    pub form: String,
    pub report_date: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
    /// Name of the information table document within the filing directory.
    pub document: String,
}

impl FilingMeta {
    pub fn accession_no_dashes(&self) -> String {
        self.accession_number.replace('-', "")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Submissions {
    pub filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionFilings {
    pub recent: RecentFilings,
}

/// Column-oriented `filings.recent` block; index `i` of every vector describes one filing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecentFilings {
    #[serde(default)]
    pub accession_number: Vec<String>,
    #[serde(default)]
    pub form: Vec<String>,
    #[serde(default)]
    pub report_date: Vec<String>,
    #[serde(default)]
    pub filing_date: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FilingIndex {
    pub directory: IndexDirectory,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IndexDirectory {
    #[serde(default)]
    pub item: Vec<IndexItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IndexItem {
    pub name: String,
}

/// Filing chosen from the submissions listing, before its document is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SelectedFiling {
    pub accession_number: String,
    pub form: String,
    pub report_date: Option<NaiveDate>,
    pub filing_date: Option<NaiveDate>,
}

impl SelectedFiling {
    pub fn into_meta(self, cik: &str, document: String) -> FilingMeta {
        FilingMeta {
            cik: cik.to_string(),
            accession_number: self.accession_number,
            form: self.form,
            report_date: self.report_date,
            filing_date: self.filing_date,
            document,
        }
    }
}

fn edgar_date(raw: Option<&String>) -> Option<NaiveDate> {
    raw.and_then(|value| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok())
}

/// Most recent 13F-HR (amendments included) whose report date is not after `before`.
///
/// Recency is the filing date; entries sharing a filing date keep the listing order, which
/// EDGAR serves newest first.
pub(crate) fn select_filing(
    recent: &RecentFilings,
    before: Option<NaiveDate>,
) -> Option<SelectedFiling> {
    let mut best: Option<SelectedFiling> = None;
    for (idx, accession) in recent.accession_number.iter().enumerate() {
        let Some(form) = recent.form.get(idx) else {
            continue;
        };
        if !form.trim().to_ascii_uppercase().starts_with("13F-HR") {
            continue;
        }
        let report_date = edgar_date(recent.report_date.get(idx));
        if let Some(limit) = before {
            match report_date {
                Some(date) if date <= limit => {}
                _ => continue,
            }
        }
        let candidate = SelectedFiling {
            accession_number: accession.trim().to_string(),
            form: form.trim().to_string(),
            report_date,
            filing_date: edgar_date(recent.filing_date.get(idx)),
        };
        let newer = match &best {
            None => true,
            Some(current) => candidate.filing_date > current.filing_date,
        };
        if newer {
            best = Some(candidate);
        }
    }
    best
}

/// Picks the information table: an XML named like `*info*` or `*13f*`, else any XML besides
/// the primary document, else the full `.txt` submission.
pub(crate) fn choose_document(items: &[IndexItem], accession_number: &str) -> Option<String> {
    let xml: Vec<&str> = items
        .iter()
        .map(|item| item.name.as_str())
        .filter(|name| name.to_ascii_lowercase().ends_with(".xml"))
        .collect();
    let named = xml.iter().find(|name| {
        let lower = name.to_ascii_lowercase();
        lower != PRIMARY_DOCUMENT && (lower.contains("info") || lower.contains("13f"))
    });
    if let Some(name) = named {
        return Some(name.to_string());
    }
    if let Some(name) = xml
        .iter()
        .find(|name| !name.eq_ignore_ascii_case(PRIMARY_DOCUMENT))
    {
        return Some(name.to_string());
    }
    if items.is_empty() {
        return None;
    }
    let submission = format!("{accession_number}.txt");
    let listed = items
        .iter()
        .find(|item| item.name.eq_ignore_ascii_case(&submission))
        .or_else(|| {
            items
                .iter()
                .find(|item| item.name.to_ascii_lowercase().ends_with(".txt"))
        });
    Some(listed.map(|item| item.name.clone()).unwrap_or(submission))
}

pub(crate) fn submissions_url(data_base: &str, cik_padded: &str) -> String {
    format!(
        "{}/submissions/CIK{cik_padded}.json",
        data_base.trim_end_matches('/')
    )
}

pub(crate) fn filing_dir_url(archives_base: &str, cik_digits: &str, accession: &str) -> String {
    format!(
        "{}/Archives/edgar/data/{cik_digits}/{}",
        archives_base.trim_end_matches('/'),
        accession.replace('-', "")
    )
}
