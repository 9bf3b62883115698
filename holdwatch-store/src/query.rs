use chrono::NaiveDate;

/// Filter describing which stored holdings to load.
#[derive(Clone, Debug, Default)]
pub struct HoldingsQuery {
    pub fund_ticker: Option<String>,
    pub as_of_date: Option<NaiveDate>,
    pub ticker: Option<String>,
    pub cusip: Option<String>,
    pub limit: Option<usize>,
}

impl HoldingsQuery {
    pub fn with_fund(mut self, fund_ticker: impl Into<String>) -> Self {
        self.fund_ticker = Some(fund_ticker.into().to_uppercase());
        self
    }

    pub fn with_as_of(mut self, as_of_date: NaiveDate) -> Self {
        self.as_of_date = Some(as_of_date);
        self
    }

    pub fn with_ticker(mut self, ticker: impl Into<String>) -> Self {
        self.ticker = Some(ticker.into().to_uppercase());
        self
    }

    pub fn with_cusip(mut self, cusip: impl Into<String>) -> Self {
        self.cusip = Some(cusip.into().to_uppercase());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
