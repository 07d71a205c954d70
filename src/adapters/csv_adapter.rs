//! CSV data directory adapter.
//!
//! Layout under `base_path`:
//! - `universe.csv`: `filter,ticker`
//! - `fundamentals.csv`: `ticker,name,country,sector,market_cap,revenue`
//! - `<TICKER>.csv`: `date,close`

use crate::domain::error::AlphaflexError;
use crate::domain::filters::Criteria;
use crate::domain::fundamentals::FundamentalSnapshot;
use crate::domain::period::TRADING_DAYS_PER_YEAR;
use crate::domain::price_series::PriceSeries;
use crate::domain::universe::is_safe_ticker;
use crate::ports::data_port::{FundamentalsPort, PriceHistoryPort, TickerUniversePort};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct UniverseRow {
    filter: String,
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct FundamentalRow {
    ticker: String,
    name: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    market_cap: Option<f64>,
    revenue: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: String,
    close: f64,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn price_path(&self, ticker: &str) -> Result<PathBuf, AlphaflexError> {
        if !is_safe_ticker(ticker) {
            return Err(AlphaflexError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: "ticker is not a valid file name".into(),
            });
        }
        Ok(self.base_path.join(format!("{ticker}.csv")))
    }

    fn reader(path: &Path) -> Result<csv::Reader<File>, AlphaflexError> {
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| AlphaflexError::Provider {
                reason: format!("failed to read {}: {}", path.display(), e),
            })
    }

    fn parse_error(path: &Path, e: impl std::fmt::Display) -> AlphaflexError {
        AlphaflexError::Provider {
            reason: format!("CSV parse error in {}: {}", path.display(), e),
        }
    }

    /// All rows of a ticker's price file, date-ascending.
    fn read_prices(&self, ticker: &str) -> Result<Vec<(NaiveDate, f64)>, AlphaflexError> {
        let path = self.price_path(ticker)?;
        if !path.exists() {
            return Err(AlphaflexError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: format!("no price file at {}", path.display()),
            });
        }

        let mut rdr = Self::reader(&path)?;
        let mut rows = Vec::new();
        for result in rdr.deserialize::<PriceRow>() {
            let row = result.map_err(|e| Self::parse_error(&path, e))?;
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d")
                .map_err(|e| Self::parse_error(&path, format!("invalid date format: {e}")))?;
            rows.push((date, row.close));
        }
        rows.sort_by_key(|(date, _)| *date);
        Ok(rows)
    }
}

impl TickerUniversePort for CsvAdapter {
    fn screen(&self, filter_name: &str, _: &Criteria) -> Result<Vec<String>, AlphaflexError> {
        let path = self.base_path.join("universe.csv");
        let mut rdr = Self::reader(&path)?;

        let mut tickers = Vec::new();
        for result in rdr.deserialize::<UniverseRow>() {
            let row = result.map_err(|e| Self::parse_error(&path, e))?;
            if row.filter.eq_ignore_ascii_case(filter_name) {
                tickers.push(row.ticker);
            }
        }
        Ok(tickers)
    }
}

impl FundamentalsPort for CsvAdapter {
    fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalSnapshot, AlphaflexError> {
        let path = self.base_path.join("fundamentals.csv");
        let mut rdr = Self::reader(&path)?;

        let mut found = None;
        for result in rdr.deserialize::<FundamentalRow>() {
            let row = result.map_err(|e| Self::parse_error(&path, e))?;
            if row.ticker.eq_ignore_ascii_case(ticker) {
                found = Some(row);
            }
        }
        let row = found.ok_or_else(|| AlphaflexError::DataUnavailable {
            ticker: ticker.to_string(),
            reason: "not listed in fundamentals.csv".into(),
        })?;

        let recent_closes = match self.read_prices(ticker) {
            Ok(rows) => {
                let skip = rows.len().saturating_sub(TRADING_DAYS_PER_YEAR);
                rows.into_iter().skip(skip).map(|(_, close)| close).collect()
            }
            Err(e) => {
                debug!("{ticker}: no recent closes ({e})");
                Vec::new()
            }
        };

        Ok(FundamentalSnapshot {
            ticker: ticker.to_string(),
            name: row.name,
            country: row.country,
            sector: row.sector,
            market_cap: row.market_cap,
            revenue: row.revenue,
            recent_closes,
        })
    }
}

impl PriceHistoryPort for CsvAdapter {
    fn fetch_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AlphaflexError> {
        let rows = self.read_prices(ticker)?;
        Ok(PriceSeries::new(
            rows.into_iter()
                .filter(|(date, _)| *date >= start && *date <= end),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("universe.csv"),
            "filter,ticker\n\
             High Growth,AAPL\n\
             High Growth,MSFT\n\
             Bullish,NVDA\n",
        )
        .unwrap();
        fs::write(
            path.join("fundamentals.csv"),
            "ticker,name,country,sector,market_cap,revenue\n\
             AAPL,Apple Inc.,United States,Technology,3000000000000,383000000000\n\
             MSFT,Microsoft,United States,Technology,,\n",
        )
        .unwrap();
        fs::write(
            path.join("AAPL.csv"),
            "date,close\n\
             2024-01-17,115.0\n\
             2024-01-15,105.0\n\
             2024-01-16,110.0\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn screen_returns_filter_members() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let tickers = adapter.screen("High Growth", &Criteria::new()).unwrap();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
        assert!(adapter.screen("Buy and Hold", &Criteria::new()).unwrap().is_empty());
    }

    #[test]
    fn screen_without_universe_file_is_provider_error() {
        let dir = TempDir::new().unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter.screen("High Growth", &Criteria::new()).unwrap_err();
        assert!(matches!(err, AlphaflexError::Provider { .. }));
    }

    #[test]
    fn fundamentals_include_recent_closes() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let snapshot = adapter.fetch_fundamentals("AAPL").unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("Apple Inc."));
        assert_eq!(snapshot.country.as_deref(), Some("United States"));
        assert_eq!(snapshot.market_cap, Some(3.0e12));
        assert_eq!(snapshot.recent_closes, vec![105.0, 110.0, 115.0]);
    }

    #[test]
    fn empty_fundamental_fields_are_none() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let snapshot = adapter.fetch_fundamentals("MSFT").unwrap();
        assert_eq!(snapshot.market_cap, None);
        assert_eq!(snapshot.revenue, None);
        assert!(snapshot.recent_closes.is_empty());
    }

    #[test]
    fn unlisted_ticker_is_unavailable() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let err = adapter.fetch_fundamentals("XYZ").unwrap_err();
        assert!(matches!(err, AlphaflexError::DataUnavailable { ticker, .. } if ticker == "XYZ"));
    }

    #[test]
    fn fetch_closes_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let start = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 17).unwrap();
        let series = adapter.fetch_closes("AAPL", start, end).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().date, start);
        assert_eq!(series.last().unwrap().close, 115.0);
    }

    #[test]
    fn fetch_closes_missing_file_is_unavailable() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let result = adapter.fetch_closes("XYZ", start, end);

        assert!(matches!(result, Err(AlphaflexError::DataUnavailable { .. })));
    }

    #[test]
    fn fetch_closes_rejects_path_like_ticker() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let result = adapter.fetch_closes("../OUTSIDE", start, end);

        assert!(matches!(
            result,
            Err(AlphaflexError::DataUnavailable { reason, .. }) if reason.contains("valid file name")
        ));
    }
}
