use std::collections::{BTreeMap, BTreeSet};

use holdwatch_core::CanonicalField;

/// Vendor spellings recognised without configuration, in compact form (lowercase `[a-z0-9%$]`).
const DEFAULT_ALIASES: &[(&str, CanonicalField)] = &[
    ("ticker", CanonicalField::Ticker),
    ("symbol", CanonicalField::Ticker),
    ("tickersymbol", CanonicalField::Ticker),
    ("stockticker", CanonicalField::Ticker),
    ("holdingticker", CanonicalField::Ticker),
    ("name", CanonicalField::Name),
    ("company", CanonicalField::Name),
    ("companyname", CanonicalField::Name),
    ("security", CanonicalField::Name),
    ("securityname", CanonicalField::Name),
    ("securitydescription", CanonicalField::Name),
    ("description", CanonicalField::Name),
    ("holding", CanonicalField::Name),
    ("holdingname", CanonicalField::Name),
    ("issuer", CanonicalField::Name),
    ("nameofissuer", CanonicalField::Name),
    ("cusip", CanonicalField::Cusip),
    ("fundcusip", CanonicalField::Cusip),
    ("securitycusip", CanonicalField::Cusip),
    ("isin", CanonicalField::Isin),
    ("securityisin", CanonicalField::Isin),
    ("sedol", CanonicalField::Sedol),
    ("securitysedol", CanonicalField::Sedol),
    ("shares", CanonicalField::Shares),
    ("sharesheld", CanonicalField::Shares),
    ("sharesquantity", CanonicalField::Shares),
    ("quantity", CanonicalField::Shares),
    ("qty", CanonicalField::Shares),
    ("units", CanonicalField::Shares),
    ("sharesparvalue", CanonicalField::Shares),
    ("weight", CanonicalField::WeightPct),
    ("weight%", CanonicalField::WeightPct),
    ("weightpercent", CanonicalField::WeightPct),
    ("weighting", CanonicalField::WeightPct),
    ("portfolioweight", CanonicalField::WeightPct),
    ("portfolioweight%", CanonicalField::WeightPct),
    ("%ofnetassets", CanonicalField::WeightPct),
    ("%ofnav", CanonicalField::WeightPct),
    ("%offund", CanonicalField::WeightPct),
    ("marketvalue%", CanonicalField::WeightPct),
    ("marketvalue", CanonicalField::MarketValueUsd),
    ("marketvalue$", CanonicalField::MarketValueUsd),
    ("marketvalueusd", CanonicalField::MarketValueUsd),
    ("mktval", CanonicalField::MarketValueUsd),
    ("mktvalue", CanonicalField::MarketValueUsd),
    ("notionalvalue", CanonicalField::MarketValueUsd),
    ("date", CanonicalField::AsOfDate),
    ("asof", CanonicalField::AsOfDate),
    ("asofdate", CanonicalField::AsOfDate),
    ("effectivedate", CanonicalField::AsOfDate),
    ("reportdate", CanonicalField::AsOfDate),
    ("fund", CanonicalField::FundTicker),
    ("fundticker", CanonicalField::FundTicker),
];

/// Maps vendor column headers onto canonical fields.
///
/// Configured headers match on case, surrounding whitespace and quotes; the built-in aliases
/// match on the compact form. A field with configured headers ignores the built-in aliases.
#[derive(Clone, Debug, Default)]
pub struct HeaderResolver {
    explicit: Vec<(String, CanonicalField)>,
    overridden: BTreeSet<CanonicalField>,
}

impl HeaderResolver {
    pub fn new(column_map: &BTreeMap<CanonicalField, Vec<String>>) -> Self {
        let mut explicit = Vec::new();
        let mut overridden = BTreeSet::new();
        for (field, headers) in column_map {
            overridden.insert(*field);
            for header in headers {
                explicit.push((normalized(header), *field));
            }
        }
        Self {
            explicit,
            overridden,
        }
    }

    pub fn resolve(&self, header: &str) -> Option<CanonicalField> {
        let wanted = normalized(header);
        if wanted.is_empty() {
            return None;
        }
        if let Some((_, field)) = self.explicit.iter().find(|(name, _)| *name == wanted) {
            return Some(*field);
        }
        let compact = compact(header);
        DEFAULT_ALIASES
            .iter()
            .find(|(alias, field)| *alias == compact && !self.overridden.contains(field))
            .map(|(_, field)| *field)
    }

    /// Resolves a header row; only the first column claiming a field is mapped.
    pub fn resolve_row(&self, headers: &[String]) -> Vec<Option<CanonicalField>> {
        let mut claimed = BTreeSet::new();
        headers
            .iter()
            .map(|header| {
                self.resolve(header)
                    .filter(|field| claimed.insert(*field))
            })
            .collect()
    }

    /// Whether a candidate row looks like the table header: two or more distinct fields, one
    /// of which identifies the security.
    pub fn is_header(&self, headers: &[String]) -> bool {
        let fields: BTreeSet<CanonicalField> =
            self.resolve_row(headers).into_iter().flatten().collect();
        let identifies = fields.iter().any(|field| {
            matches!(
                field,
                CanonicalField::Ticker
                    | CanonicalField::Name
                    | CanonicalField::Cusip
                    | CanonicalField::Isin
                    | CanonicalField::Sedol
            )
        });
        fields.len() >= 2 && identifies
    }
}

fn normalized(header: &str) -> String {
    header
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn compact(header: &str) -> String {
    header
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '%' | '$'))
        .collect()
}
