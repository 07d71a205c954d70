//! Market data ports: ticker screening, fundamentals and price history.

use crate::domain::error::AlphaflexError;
use crate::domain::filters::Criteria;
use crate::domain::fundamentals::FundamentalSnapshot;
use crate::domain::price_series::PriceSeries;
use chrono::NaiveDate;

/// Turns one named filter into the tickers that satisfy it.
pub trait TickerUniversePort {
    fn screen(&self, filter_name: &str, criteria: &Criteria)
    -> Result<Vec<String>, AlphaflexError>;
}

pub trait FundamentalsPort {
    fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalSnapshot, AlphaflexError>;

    /// Default implementation: one `fetch_fundamentals` call per ticker, in order.
    /// Adapters that batch or rate-limit override this.
    fn fetch_many(
        &self,
        tickers: &[String],
    ) -> Vec<(String, Result<FundamentalSnapshot, AlphaflexError>)> {
        tickers
            .iter()
            .map(|t| (t.clone(), self.fetch_fundamentals(t)))
            .collect()
    }
}

pub trait PriceHistoryPort {
    /// Daily closes for `ticker` between `start` and `end` inclusive.
    fn fetch_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AlphaflexError>;
}
