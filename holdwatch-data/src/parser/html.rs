use std::collections::BTreeMap;

use holdwatch_core::CanonicalField;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::{DocumentFacts, HeaderResolver, TableRow};
use crate::coerce::find_date_in_text;
use crate::error::{ParseError, RowError};

/// Elements probed for the "as of" stamp when no selector is configured or it matches nothing.
const AS_OF_FALLBACKS: [&str; 3] = ["p.time-stamp.pt-3", "p.time-stamp", ".time-stamp"];

/// Rows and page-level facts extracted from a holdings page.
#[derive(Clone, Debug, Default)]
pub struct HtmlTable {
    pub rows: Vec<Result<TableRow, RowError>>,
    pub facts: DocumentFacts,
}

/// Parses the holdings table of a vendor web page.
#[derive(Clone, Debug)]
pub struct HtmlTableParser {
    resolver: HeaderResolver,
    table_selector: String,
    as_of_selector: Option<String>,
}

impl HtmlTableParser {
    pub fn new(
        column_map: &BTreeMap<CanonicalField, Vec<String>>,
        table_selector: impl Into<String>,
        as_of_selector: Option<String>,
    ) -> Self {
        Self {
            resolver: HeaderResolver::new(column_map),
            table_selector: table_selector.into(),
            as_of_selector,
        }
    }

    /// Parses the first table matching the selector whose header names holdings columns.
    pub fn parse(&self, html: &str) -> Result<HtmlTable, ParseError> {
        let document = Html::parse_document(html);
        let table_selector = selector(&self.table_selector)?;
        let tables: Vec<ElementRef<'_>> = document.select(&table_selector).collect();
        if tables.is_empty() {
            return Err(ParseError::TableNotFound(self.table_selector.clone()));
        }

        let row_selector = selector("tr")?;
        let head_selector = selector("thead th")?;
        let cell_selector = selector("th, td")?;
        for (table_idx, table) in tables.iter().enumerate() {
            let all_rows: Vec<ElementRef<'_>> = table.select(&row_selector).collect();
            let head: Vec<String> = table.select(&head_selector).map(cell_text).collect();
            let (headers, body_start) = if head.is_empty() {
                let Some(first) = all_rows.first() else {
                    continue;
                };
                (first.select(&cell_selector).map(cell_text).collect(), 1)
            } else {
                // Rows living in <thead> are not data.
                let in_head = all_rows
                    .iter()
                    .take_while(|row| {
                        row.parent()
                            .and_then(ElementRef::wrap)
                            .map(|parent| parent.value().name() == "thead")
                            .unwrap_or(false)
                    })
                    .count();
                (head, in_head)
            };
            if !self.resolver.is_header(&headers) {
                continue;
            }
            let columns = self.resolver.resolve_row(&headers);
            debug!(table = table_idx, columns = columns.len(), "located html holdings table");

            let mut rows = Vec::new();
            for (offset, row) in all_rows.iter().enumerate().skip(body_start) {
                let line = offset - body_start + 1;
                let cells: Vec<String> = row.select(&cell_selector).map(cell_text).collect();
                if cells.iter().all(String::is_empty) {
                    continue;
                }
                let mut parsed = TableRow {
                    line,
                    ..TableRow::default()
                };
                for (idx, value) in cells.into_iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    match columns.get(idx).copied().flatten() {
                        Some(field) => {
                            parsed.values.insert(field, value);
                        }
                        None => {
                            let name = headers
                                .get(idx)
                                .filter(|h| !h.is_empty())
                                .cloned()
                                .unwrap_or_else(|| format!("column_{}", idx + 1));
                            parsed.extras.insert(name, value);
                        }
                    }
                }
                if parsed.has_measure() {
                    rows.push(Ok(parsed));
                } else {
                    rows.push(Err(RowError::Empty { line }));
                }
            }
            let facts = DocumentFacts {
                fund_ticker: None,
                as_of_date: self.find_as_of(&document)?,
            };
            return Ok(HtmlTable { rows, facts });
        }
        Err(ParseError::MissingHeader {
            scanned: tables.len(),
        })
    }

    fn find_as_of(&self, document: &Html) -> Result<Option<chrono::NaiveDate>, ParseError> {
        let mut candidates: Vec<&str> = Vec::new();
        if let Some(custom) = self.as_of_selector.as_deref() {
            candidates.push(custom);
        }
        candidates.extend(AS_OF_FALLBACKS);
        for candidate in candidates {
            let sel = selector(candidate)?;
            for element in document.select(&sel) {
                if let Some(date) = find_date_in_text(&cell_text(element)) {
                    return Ok(Some(date));
                }
            }
        }
        let page_text = cell_text(document.root_element());
        Ok(find_date_in_text(&page_text))
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|err| ParseError::Selector {
        selector: css.to_string(),
        message: err.to_string(),
    })
}

fn cell_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
