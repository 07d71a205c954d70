//! Per-ticker fundamentals and their collection from a provider.

use crate::domain::error::AlphaflexError;
use crate::ports::data_port::FundamentalsPort;
use statrs::statistics::Statistics;
use tracing::{debug, warn};

/// Raw provider answer for one ticker. Missing values stay `None` here and
/// are defaulted when the record is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FundamentalSnapshot {
    pub ticker: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<f64>,
    pub revenue: Option<f64>,
    pub recent_closes: Vec<f64>,
}

/// Point-in-time fundamentals used by the allocation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FundamentalRecord {
    pub ticker: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub market_cap: f64,
    pub revenue: f64,
    /// Population standard deviation of the recent closes.
    pub volatility: f64,
}

impl FundamentalRecord {
    pub fn new(ticker: impl Into<String>, market_cap: f64, revenue: f64, volatility: f64) -> Self {
        Self {
            ticker: ticker.into(),
            name: None,
            country: None,
            sector: None,
            market_cap,
            revenue,
            volatility,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn from_snapshot(snapshot: FundamentalSnapshot) -> Self {
        let volatility = population_volatility(&snapshot.recent_closes);
        Self {
            ticker: snapshot.ticker,
            name: snapshot.name,
            country: snapshot.country,
            sector: snapshot.sector,
            market_cap: snapshot.market_cap.unwrap_or(0.0),
            revenue: snapshot.revenue.unwrap_or(0.0),
            volatility,
        }
    }
}

/// Population std-dev of the finite closes; 0 when there are none.
pub fn population_volatility(closes: &[f64]) -> f64 {
    let finite: Vec<f64> = closes.iter().copied().filter(|c| c.is_finite()).collect();
    if finite.is_empty() {
        return 0.0;
    }
    finite.iter().population_std_dev()
}

#[derive(Debug, Default)]
pub struct FundamentalsCollection {
    pub records: Vec<FundamentalRecord>,
    pub unavailable: Vec<AlphaflexError>,
}

/// Fetch fundamentals for every ticker. A failing ticker is logged, recorded
/// as `DataUnavailable` and skipped; it never aborts the batch.
pub fn collect_fundamentals(
    port: &dyn FundamentalsPort,
    tickers: &[String],
) -> FundamentalsCollection {
    let mut collection = FundamentalsCollection::default();

    for (ticker, result) in port.fetch_many(tickers) {
        match result {
            Ok(snapshot) => {
                let record = FundamentalRecord::from_snapshot(FundamentalSnapshot {
                    ticker: ticker.clone(),
                    ..snapshot
                });
                debug!(
                    ticker = %record.ticker,
                    market_cap = record.market_cap,
                    revenue = record.revenue,
                    volatility = record.volatility,
                    "fundamentals fetched"
                );
                collection.records.push(record);
            }
            Err(e) => {
                let err = e.for_ticker(&ticker);
                warn!("skipping {ticker}: {err}");
                collection.unavailable.push(err);
            }
        }
    }

    collection
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    struct StubFundamentals {
        data: HashMap<String, FundamentalSnapshot>,
    }

    impl FundamentalsPort for StubFundamentals {
        fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalSnapshot, AlphaflexError> {
            self.data
                .get(ticker)
                .cloned()
                .ok_or_else(|| AlphaflexError::Provider {
                    reason: "not found".into(),
                })
        }
    }

    #[test]
    fn population_volatility_matches_numpy_std() {
        // numpy.std([2, 4, 4, 4, 5, 5, 7, 9]) == 2.0
        let closes = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(population_volatility(&closes), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn population_volatility_empty_is_zero() {
        assert_eq!(population_volatility(&[]), 0.0);
        assert_eq!(population_volatility(&[f64::NAN]), 0.0);
    }

    #[test]
    fn population_volatility_ignores_nan() {
        let closes = [2.0, f64::NAN, 4.0];
        assert_relative_eq!(population_volatility(&closes), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn from_snapshot_defaults_missing_values() {
        let record = FundamentalRecord::from_snapshot(FundamentalSnapshot {
            ticker: "AAPL".into(),
            ..Default::default()
        });
        assert_eq!(record.market_cap, 0.0);
        assert_eq!(record.revenue, 0.0);
        assert_eq!(record.volatility, 0.0);
        assert_eq!(record.country, None);
    }

    #[test]
    fn collect_skips_failures() {
        let mut data = HashMap::new();
        data.insert(
            "AAPL".to_string(),
            FundamentalSnapshot {
                ticker: "AAPL".into(),
                country: Some("United States".into()),
                market_cap: Some(3.0e12),
                revenue: Some(3.8e11),
                recent_closes: vec![1.0, 3.0],
                ..Default::default()
            },
        );
        let port = StubFundamentals { data };
        let tickers = vec!["AAPL".to_string(), "NOPE".to_string()];

        let collection = collect_fundamentals(&port, &tickers);

        assert_eq!(collection.records.len(), 1);
        assert_eq!(collection.records[0].ticker, "AAPL");
        assert_relative_eq!(collection.records[0].volatility, 1.0);
        assert_eq!(collection.unavailable.len(), 1);
        assert!(matches!(
            &collection.unavailable[0],
            AlphaflexError::DataUnavailable { ticker, .. } if ticker == "NOPE"
        ));
    }
}
