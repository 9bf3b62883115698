use std::collections::BTreeMap;

use holdwatch_core::ValueUnit;
use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::Decimal;
use tracing::debug;

use super::{amount, FilingFormat, FilingParse, FilingParser};
use crate::coerce::clean_identifier;
use crate::error::ParseError;
use crate::parser::{FilingPosition, ParseWarning};

/// Parser for the XML information table, namespaced or not, standalone or embedded in a
/// full `.txt` submission.
#[derive(Clone, Copy, Debug)]
pub struct XmlInfoTableParser {
    unit: ValueUnit,
}

impl XmlInfoTableParser {
    pub fn new(unit: ValueUnit) -> Self {
        Self { unit }
    }
}

#[derive(Default)]
struct EntryFields {
    issuer: Option<String>,
    title: Option<String>,
    cusip: Option<String>,
    value: Option<String>,
    shares: Option<String>,
    extras: BTreeMap<String, String>,
}

impl FilingParser for XmlInfoTableParser {
    fn format(&self) -> FilingFormat {
        FilingFormat::Xml
    }

    fn parse(&self, bytes: &[u8]) -> Result<FilingParse, ParseError> {
        let start = table_start(bytes).ok_or(ParseError::NoInformationTable)?;
        let mut reader = Reader::from_reader(&bytes[start..]);
        reader.config_mut().trim_text(true);

        let mut parse = FilingParse::default();
        let mut buf = Vec::new();
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut current: Option<EntryFields> = None;
        let mut entries = 0usize;

        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(err) => {
                    let position = start as u64 + reader.buffer_position() as u64;
                    if parse.positions.is_empty() && parse.skipped == 0 {
                        return Err(ParseError::Xml {
                            position,
                            message: err.to_string(),
                        });
                    }
                    parse.warnings.push(ParseWarning::new(
                        format!("byte {position}"),
                        format!(
                            "xml error after entry {}, remaining entries ignored: {err}",
                            parse.positions.len() + parse.skipped
                        ),
                    ));
                    break;
                }
            };
            match event {
                Event::Start(element) => {
                    let name = local_name(element.local_name().as_ref());
                    if name == "infotable" {
                        entries += 1;
                        current = Some(EntryFields::default());
                    }
                    path.push(name);
                    text.clear();
                }
                Event::Text(content) => match content.unescape() {
                    Ok(value) => text.push_str(&value),
                    Err(err) => parse.warnings.push(ParseWarning::new(
                        format!("entry {entries}"),
                        format!("undecodable text: {err}"),
                    )),
                },
                Event::CData(content) => {
                    text.push_str(&String::from_utf8_lossy(&content.into_inner()));
                }
                Event::End(element) => {
                    let name = local_name(element.local_name().as_ref());
                    path.pop();
                    if name == "informationtable" {
                        break;
                    }
                    if name == "infotable" {
                        if let Some(fields) = current.take() {
                            match self.finish_entry(entries, fields, &mut parse.warnings) {
                                Some(position) => parse.positions.push(position),
                                None => parse.skipped += 1,
                            }
                        }
                    } else if let Some(fields) = current.as_mut() {
                        let parent = path.last().map(String::as_str).unwrap_or_default();
                        let value = text.trim();
                        if !value.is_empty() {
                            assign(fields, &name, parent, value);
                        }
                    }
                    text.clear();
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        debug!(
            positions = parse.positions.len(),
            skipped = parse.skipped,
            "parsed xml information table"
        );
        Ok(parse)
    }
}

impl XmlInfoTableParser {
    fn finish_entry(
        &self,
        entry: usize,
        fields: EntryFields,
        warnings: &mut Vec<ParseWarning>,
    ) -> Option<FilingPosition> {
        let Some(cusip) = fields.cusip.as_deref().and_then(clean_identifier) else {
            warnings.push(ParseWarning::new(
                format!("entry {entry}"),
                format!(
                    "entry without cusip ({}) skipped",
                    fields.issuer.as_deref().unwrap_or("unknown issuer")
                ),
            ));
            return None;
        };
        let value_usd = amount(
            fields.value.as_deref(),
            self.unit.multiplier(),
            "value",
            entry,
            warnings,
        );
        let shares = amount(
            fields.shares.as_deref(),
            Decimal::ONE,
            "sshPrnamt",
            entry,
            warnings,
        );
        Some(FilingPosition {
            entry,
            name_of_issuer: fields.issuer,
            title_of_class: fields.title,
            cusip,
            value_usd,
            shares,
            extras: fields.extras,
        })
    }
}

fn assign(fields: &mut EntryFields, name: &str, parent: &str, value: &str) {
    let value = value.to_string();
    match name {
        "nameofissuer" => fields.issuer = Some(value),
        "titleofclass" => fields.title = Some(value),
        "cusip" => fields.cusip = Some(value),
        "value" => fields.value = Some(value),
        "sshprnamt" => fields.shares = Some(value),
        "figi" => {
            fields.extras.insert("figi".to_string(), value);
        }
        "sshprnamttype" => {
            fields.extras.insert("sh_prn_type".to_string(), value);
        }
        "putcall" => {
            fields.extras.insert("put_call".to_string(), value);
        }
        "investmentdiscretion" => {
            fields
                .extras
                .insert("investment_discretion".to_string(), value);
        }
        "othermanager" => {
            fields
                .extras
                .entry("other_manager".to_string())
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        "sole" | "shared" | "none" if parent == "votingauthority" => {
            fields.extras.insert(format!("voting_{name}"), value);
        }
        _ => {}
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

/// Byte offset of the `<informationTable` start tag, with or without a namespace prefix.
fn table_start(bytes: &[u8]) -> Option<usize> {
    const NEEDLE: &[u8] = b"informationtable";
    let lowered = bytes.to_ascii_lowercase();
    let mut from = 0;
    while from < lowered.len() {
        let found = lowered[from..]
            .windows(NEEDLE.len())
            .position(|window| window == NEEDLE)?;
        let idx = from + found;
        let mut begin = idx;
        while begin > 0
            && (lowered[begin - 1].is_ascii_alphanumeric()
                || matches!(lowered[begin - 1], b':' | b'_' | b'-'))
        {
            begin -= 1;
        }
        if begin > 0 && lowered[begin - 1] == b'<' {
            return Some(begin - 1);
        }
        from = idx + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdwatch_test_utils::fixtures::{info_table_with_bad_entry, tci_info_table};
    use rust_decimal_macros::dec;

    fn parser() -> XmlInfoTableParser {
        XmlInfoTableParser::new(ValueUnit::Thousands)
    }

    #[test]
    fn parses_namespaced_information_table() {
        let parse = parser().parse(tci_info_table().as_bytes()).unwrap();
        assert!(parse.warnings.is_empty());
        assert_eq!(parse.positions.len(), 3);
        let apple = &parse.positions[0];
        assert_eq!(apple.entry, 1);
        assert_eq!(apple.name_of_issuer.as_deref(), Some("APPLE INC"));
        assert_eq!(apple.cusip, "037833100");
        assert_eq!(apple.value_usd, Some(dec!(5000000)));
        assert_eq!(apple.shares, Some(dec!(25000)));
        assert_eq!(apple.extras.get("sh_prn_type").map(String::as_str), Some("SH"));
        assert_eq!(apple.extras.get("voting_sole").map(String::as_str), Some("25000"));
        assert_eq!(
            parse.positions[2].title_of_class.as_deref(),
            Some("CAP STK CL A")
        );
        assert_eq!(parse.total_value(), Some(dec!(10000000)));
    }

    #[test]
    fn skips_entry_without_cusip_and_keeps_siblings() {
        let parse = parser()
            .parse(info_table_with_bad_entry().as_bytes())
            .unwrap();
        let cusips: Vec<&str> = parse.positions.iter().map(|p| p.cusip.as_str()).collect();
        assert_eq!(cusips, vec!["037833100", "594918104"]);
        assert_eq!(parse.positions[1].entry, 3);
        assert_eq!(parse.skipped, 1);
        assert_eq!(parse.warnings.len(), 1);
        assert_eq!(parse.warnings[0].locator.as_deref(), Some("entry 2"));
    }

    #[test]
    fn finds_table_inside_submission_wrapper() {
        let wrapped = format!(
            "<SEC-DOCUMENT>0001647251-25-000004.txt\n<DOCUMENT>\n<TYPE>INFORMATION TABLE\n<TEXT>\n<XML>\n{}</XML>\n</TEXT>\n</DOCUMENT>\n",
            tci_info_table()
        );
        let parse = XmlInfoTableParser::new(ValueUnit::Dollars)
            .parse(wrapped.as_bytes())
            .unwrap();
        assert_eq!(parse.positions.len(), 3);
        assert_eq!(parse.positions[0].value_usd, Some(dec!(5000)));
    }

    #[test]
    fn broken_markup_after_entries_is_a_warning() {
        let xml = "<informationTable><infoTable><nameOfIssuer>APPLE INC</nameOfIssuer>\
                   <cusip>037833100</cusip><value>10</value></infoTable>\
                   <infoTable><value>1</wrong></infoTable></informationTable>";
        let parse = parser().parse(xml.as_bytes()).unwrap();
        assert_eq!(parse.positions.len(), 1);
        assert_eq!(parse.warnings.len(), 1);
        assert!(parse.warnings[0].message.contains("after entry 1"));
    }

    #[test]
    fn broken_first_entry_is_a_parse_error() {
        let broken = "<informationTable><infoTable><value>1</cusip>";
        assert!(matches!(
            parser().parse(broken.as_bytes()),
            Err(ParseError::Xml { .. })
        ));
        assert!(matches!(
            parser().parse(b"<html>no table</html>"),
            Err(ParseError::NoInformationTable)
        ));
    }

    #[test]
    fn oversized_value_is_nulled_and_siblings_survive() {
        let xml = "<informationTable>\
                   <infoTable><nameOfIssuer>APPLE INC</nameOfIssuer>\
                   <cusip>037833100</cusip><value>10</value></infoTable>\
                   <infoTable><nameOfIssuer>HUGE CORP</nameOfIssuer><cusip>594918104</cusip>\
                   <value>79228162514264337593543950335</value></infoTable>\
                   </informationTable>";
        let parse = parser().parse(xml.as_bytes()).unwrap();
        assert_eq!(parse.positions.len(), 2);
        assert_eq!(parse.positions[0].value_usd, Some(dec!(10000)));
        assert_eq!(parse.positions[1].value_usd, None);
        assert_eq!(parse.warnings.len(), 1);
        assert_eq!(parse.warnings[0].locator.as_deref(), Some("entry 2"));
        assert_eq!(parse.total_value(), Some(dec!(10000)));
    }
}
