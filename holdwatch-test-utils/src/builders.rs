use chrono::NaiveDate;
use holdwatch_core::HoldingRecord;
use rust_decimal::Decimal;

/// Parses an ISO date, panicking on malformed test input.
pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .unwrap_or_else(|err| panic!("invalid test date {value}: {err}"))
}

/// Fluent construction of [`HoldingRecord`] values for tests.
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    record: HoldingRecord,
}

impl RecordBuilder {
    pub fn new(fund_ticker: &str, as_of: &str) -> Self {
        Self {
            record: HoldingRecord::new(fund_ticker, date(as_of)),
        }
    }

    #[must_use]
    pub fn ticker(mut self, ticker: &str) -> Self {
        self.record.ticker = Some(ticker.to_string());
        self
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.record.name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn cusip(mut self, cusip: &str) -> Self {
        self.record.cusip = Some(cusip.to_string());
        self
    }

    #[must_use]
    pub fn isin(mut self, isin: &str) -> Self {
        self.record.isin = Some(isin.to_string());
        self
    }

    #[must_use]
    pub fn shares(mut self, shares: Decimal) -> Self {
        self.record.shares = Some(shares);
        self
    }

    #[must_use]
    pub fn weight(mut self, weight_pct: Decimal) -> Self {
        self.record.weight_pct = Some(weight_pct);
        self
    }

    #[must_use]
    pub fn market_value(mut self, market_value_usd: Decimal) -> Self {
        self.record.market_value_usd = Some(market_value_usd);
        self
    }

    #[must_use]
    pub fn extra(mut self, key: &str, value: &str) -> Self {
        self.record
            .extras
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> HoldingRecord {
        self.record
    }
}

/// Shorthand for a ticker-identified record.
pub fn holding(fund_ticker: &str, as_of: &str, ticker: &str) -> RecordBuilder {
    RecordBuilder::new(fund_ticker, as_of).ticker(ticker)
}
