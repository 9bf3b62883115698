//! Canned vendor documents and EDGAR payloads shared by the test suites.

use serde_json::json;

/// One filing listed in a submissions payload.
#[derive(Clone, Debug)]
pub struct FilingStub {
    pub accession_number: &'static str,
    pub form: &'static str,
    pub report_date: &'static str,
    pub filing_date: &'static str,
}

impl FilingStub {
    pub const fn new(
        accession_number: &'static str,
        form: &'static str,
        report_date: &'static str,
        filing_date: &'static str,
    ) -> Self {
        Self {
            accession_number,
            form,
            report_date,
            filing_date,
        }
    }

    pub fn accession_no_dashes(&self) -> String {
        self.accession_number.replace('-', "")
    }
}

/// `filings.recent` payload served by the submissions API, most recent filing first.
pub fn submissions_json(cik: &str, name: &str, filings: &[FilingStub]) -> String {
    fn column(filings: &[FilingStub], pick: fn(&FilingStub) -> &'static str) -> Vec<&'static str> {
        filings.iter().map(pick).collect()
    }
    json!({
        "cik": cik.trim_start_matches('0'),
        "name": name,
        "filings": {
            "recent": {
                "accessionNumber": column(filings, |f| f.accession_number),
                "form": column(filings, |f| f.form),
                "reportDate": column(filings, |f| f.report_date),
                "filingDate": column(filings, |f| f.filing_date),
                "primaryDocument": column(filings, |_| "primary_doc.xml"),
            },
            "files": []
        }
    })
    .to_string()
}

/// Filing directory listing served under `/Archives/edgar/data/{cik}/{accession}/index.json`.
pub fn filing_index_json(directory: &str, documents: &[&str]) -> String {
    let items: Vec<_> = documents
        .iter()
        .map(|name| json!({"name": name, "type": "text.gif", "size": "1024"}))
        .collect();
    json!({"directory": {"name": directory, "item": items}}).to_string()
}

/// One `infoTable` entry; `cusip: None` renders an entry without the element.
#[derive(Clone, Debug)]
pub struct InfoEntry {
    pub issuer: &'static str,
    pub title: &'static str,
    pub cusip: Option<&'static str>,
    pub value: &'static str,
    pub shares: &'static str,
}

impl InfoEntry {
    pub const fn new(
        issuer: &'static str,
        cusip: &'static str,
        value: &'static str,
        shares: &'static str,
    ) -> Self {
        Self {
            issuer,
            title: "COM",
            cusip: Some(cusip),
            value,
            shares,
        }
    }

    pub const fn without_cusip(issuer: &'static str, value: &'static str) -> Self {
        Self {
            issuer,
            title: "COM",
            cusip: None,
            value,
            shares: "100",
        }
    }
}

/// Namespaced XML information table in the layout EDGAR serves today.
pub fn info_table_xml(entries: &[InfoEntry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <ns1:informationTable xmlns:ns1=\"http://www.sec.gov/edgar/document/thirteenf/informationtable\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n",
    );
    for entry in entries {
        xml.push_str("  <ns1:infoTable>\n");
        xml.push_str(&format!(
            "    <ns1:nameOfIssuer>{}</ns1:nameOfIssuer>\n",
            entry.issuer.replace('&', "&amp;")
        ));
        xml.push_str(&format!(
            "    <ns1:titleOfClass>{}</ns1:titleOfClass>\n",
            entry.title
        ));
        if let Some(cusip) = entry.cusip {
            xml.push_str(&format!("    <ns1:cusip>{cusip}</ns1:cusip>\n"));
        }
        xml.push_str(&format!("    <ns1:value>{}</ns1:value>\n", entry.value));
        xml.push_str(&format!(
            "    <ns1:shrsOrPrnAmt>\n      <ns1:sshPrnamt>{}</ns1:sshPrnamt>\n      \
             <ns1:sshPrnamtType>SH</ns1:sshPrnamtType>\n    </ns1:shrsOrPrnAmt>\n",
            entry.shares
        ));
        xml.push_str("    <ns1:investmentDiscretion>SOLE</ns1:investmentDiscretion>\n");
        xml.push_str(&format!(
            "    <ns1:votingAuthority>\n      <ns1:Sole>{}</ns1:Sole>\n      \
             <ns1:Shared>0</ns1:Shared>\n      <ns1:None>0</ns1:None>\n    </ns1:votingAuthority>\n",
            entry.shares
        ));
        xml.push_str("  </ns1:infoTable>\n");
    }
    xml.push_str("</ns1:informationTable>\n");
    xml
}

/// Three positions worth $10,000,000 in total (values in thousands): 50% / 30% / 20%.
pub fn tci_info_table() -> String {
    info_table_xml(&[
        InfoEntry::new("APPLE INC", "037833100", "5000", "25000"),
        InfoEntry::new("MICROSOFT CORP", "594918104", "3000", "10000"),
        InfoEntry {
            title: "CAP STK CL A",
            ..InfoEntry::new("ALPHABET INC", "02079K305", "2000", "15000")
        },
    ])
}

/// The prior quarter of [`tci_info_table`]: Microsoft held fewer shares, Meta instead of Alphabet.
pub fn tci_previous_info_table() -> String {
    info_table_xml(&[
        InfoEntry::new("APPLE INC", "037833100", "5000", "25000"),
        InfoEntry::new("MICROSOFT CORP", "594918104", "2400", "8000"),
        InfoEntry {
            title: "CL A",
            ..InfoEntry::new("META PLATFORMS INC", "30303M102", "2600", "4000")
        },
    ])
}

/// Information table where the middle entry lacks its CUSIP.
pub fn info_table_with_bad_entry() -> String {
    info_table_xml(&[
        InfoEntry::new("APPLE INC", "037833100", "5000", "25000"),
        InfoEntry::without_cusip("MYSTERY HOLDINGS", "700"),
        InfoEntry::new("MICROSOFT CORP", "594918104", "3000", "10000"),
    ])
}

/// Pre-2013 text submission with a fixed-width information table.
///
/// Cisco is reported with its CUSIP split into issuer, issue and check digit groups.
pub const LEGACY_TEXT_FILING: &str = "\
<SEC-DOCUMENT>0000950123-01-500123.txt : 20010214
<SEC-HEADER>0000950123-01-500123.hdr.sgml : 20010214
ACCESSION NUMBER:\t\t0000950123-01-500123
CONFORMED SUBMISSION TYPE:\t13F-HR
CONFORMED PERIOD OF REPORT:\t20001231
</SEC-HEADER>
<DOCUMENT>
<TYPE>13F-HR
<TEXT>
                         FORM 13F INFORMATION TABLE

Report Summary: 4 entries, total value $7,050 (thousands)

<TABLE>
<CAPTION>
                                                   VALUE     SHARES/  SH/  PUT/  INVSTMT  OTHER      VOTING AUTHORITY
NAME OF ISSUER            TITLE OF CLASS  CUSIP      (x$1000)  PRN AMT  PRN  CALL  DSCRETN  MANAGERS   SOLE   SHARED  NONE
<S>                       <C>             <C>        <C>       <C>      <C>  <C>   <C>      <C>        <C>    <C>     <C>
APPLE COMPUTER INC        COM             037833100      1250    60000  SH         SOLE                60000
MICROSOFT CORP            COM             594918104      4300    99000  SH         SOLE                99000
INTEL CORP                COM             458140100       900    30000  SH   CALL  SOLE                30000
CISCO SYSTEMS INC         COM             17275R 10 2     600    15000  SH         SOLE                15000
</TABLE>
</TEXT>
</DOCUMENT>
</SEC-DOCUMENT>
";

/// ARK-style holdings download: US date column, quoted thousands, `$` values and `%` weights,
/// followed by a disclaimer footer row.
pub const ARK_CSV: &str = "\
date,fund,company,ticker,cusip,shares,\"market value ($)\",\"weight (%)\"
09/24/2025,ARKK,\"TESLA INC\",TSLA,88160R101,\"2,000,000\",\"$850,000,000.00\",10.50%
09/24/2025,ARKK,\"COINBASE GLOBAL INC -CLASS A\",COIN,19260Q107,\"1,500,000\",\"$500,000,000.00\",6.18%
09/24/2025,ARKK,\"ROKU INC\",ROKU,77543R102,\"3,000,000\",\"$250,000,000.00\",3.09%
\"Investors should carefully consider the investment objectives and risks before investing.\"
";

/// Vendor export with a preamble before the header row and fractional weights.
pub const PREAMBLE_CSV: &str = "\
Wedbush Technology Innovators ETF
Ticker Symbol:,IVES
Holdings as of 09/24/2025
Ticker,Name,CUSIP,Shares,MktVal,Weight
aapl ,Apple Inc,037833100,\"1,000\",\"$1,234,000\",0.0512
msft,Microsoft Corp,594918104,500,\"$215,000.00\",0.0433
,Cash & Other,,,\"$12,000.00\",
Holdings are subject to change.
";

/// Holdings page with a time-stamp paragraph and a classed table.
pub const HOLDINGS_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head><title>GRNY Holdings</title></head>
  <body>
    <div class="fund-header">
      <h1>Fundstrat Granny Shots US Large Cap ETF</h1>
      <p class="time-stamp pt-3">Holdings as of September 24, 2025</p>
    </div>
    <table class="nav-summary"><tr><td>NAV</td><td>$23.10</td></tr></table>
    <table class="holdings">
      <thead>
        <tr><th>Ticker</th><th>Name</th><th>Weight</th><th>Market Value</th><th>Shares</th></tr>
      </thead>
      <tbody>
        <tr><td>nvda</td><td>NVIDIA Corp</td><td>4.25%</td><td>$1,200,000.00</td><td>6,500</td></tr>
        <tr><td>AMZN</td><td>Amazon.com Inc</td><td>3.90%</td><td>$1,100,000.00</td><td>5,000</td></tr>
        <tr><td>META</td><td>Meta Platforms Inc</td><td>N/A</td><td>$980,000.00</td><td>1,400</td></tr>
      </tbody>
    </table>
  </body>
</html>
"#;
