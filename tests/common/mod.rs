#![allow(dead_code)]

use alphaflex::domain::error::AlphaflexError;
use alphaflex::domain::filters::Criteria;
use alphaflex::domain::fundamentals::FundamentalSnapshot;
use alphaflex::domain::portfolio::Holding;
use alphaflex::domain::price_series::PriceSeries;
use alphaflex::ports::cache_port::AllocationCachePort;
use alphaflex::ports::data_port::{FundamentalsPort, PriceHistoryPort, TickerUniversePort};
use chrono::NaiveDate;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::SystemTime;

/// In-memory provider implementing all three data ports.
pub struct MockMarketData {
    pub screens: HashMap<String, Vec<String>>,
    pub screen_errors: HashMap<String, String>,
    pub fundamentals: HashMap<String, FundamentalSnapshot>,
    pub prices: HashMap<String, Vec<(NaiveDate, f64)>>,
    pub price_errors: HashMap<String, String>,
    pub fundamentals_calls: RefCell<usize>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            screens: HashMap::new(),
            screen_errors: HashMap::new(),
            fundamentals: HashMap::new(),
            prices: HashMap::new(),
            price_errors: HashMap::new(),
            fundamentals_calls: RefCell::new(0),
        }
    }

    pub fn with_screen(mut self, filter: &str, tickers: &[&str]) -> Self {
        self.screens.insert(
            filter.to_string(),
            tickers.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_screen_error(mut self, filter: &str, reason: &str) -> Self {
        self.screen_errors
            .insert(filter.to_string(), reason.to_string());
        self
    }

    pub fn with_company(
        mut self,
        ticker: &str,
        country: &str,
        market_cap: f64,
        revenue: f64,
        recent_closes: Vec<f64>,
    ) -> Self {
        self.fundamentals.insert(
            ticker.to_string(),
            FundamentalSnapshot {
                ticker: ticker.to_string(),
                name: Some(format!("{ticker} Corp")),
                country: Some(country.to_string()),
                sector: Some("Technology".to_string()),
                market_cap: Some(market_cap),
                revenue: Some(revenue),
                recent_closes,
            },
        );
        self
    }

    pub fn with_prices(mut self, ticker: &str, closes: Vec<(NaiveDate, f64)>) -> Self {
        self.prices.insert(ticker.to_string(), closes);
        self
    }

    pub fn with_price_error(mut self, ticker: &str, reason: &str) -> Self {
        self.price_errors
            .insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl TickerUniversePort for MockMarketData {
    fn screen(&self, filter_name: &str, _: &Criteria) -> Result<Vec<String>, AlphaflexError> {
        if let Some(reason) = self.screen_errors.get(filter_name) {
            return Err(AlphaflexError::Provider {
                reason: reason.clone(),
            });
        }
        Ok(self.screens.get(filter_name).cloned().unwrap_or_default())
    }
}

impl FundamentalsPort for MockMarketData {
    fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalSnapshot, AlphaflexError> {
        *self.fundamentals_calls.borrow_mut() += 1;
        self.fundamentals
            .get(ticker)
            .cloned()
            .ok_or_else(|| AlphaflexError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: "unknown ticker".into(),
            })
    }
}

impl PriceHistoryPort for MockMarketData {
    fn fetch_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AlphaflexError> {
        if let Some(reason) = self.price_errors.get(ticker) {
            return Err(AlphaflexError::Provider {
                reason: reason.clone(),
            });
        }
        let rows = self.prices.get(ticker).cloned().unwrap_or_default();
        Ok(PriceSeries::new(
            rows.into_iter().filter(|(d, _)| *d >= start && *d <= end),
        ))
    }
}

/// Cache held in memory; `fresh` decides what `load_fresh` returns.
#[derive(Default)]
pub struct MemoryCache {
    pub fresh: RefCell<Option<Vec<Holding>>>,
    pub writes: RefCell<usize>,
}

impl AllocationCachePort for MemoryCache {
    fn load_fresh(&self, _now: SystemTime) -> Result<Option<Vec<Holding>>, AlphaflexError> {
        Ok(self.fresh.borrow().clone())
    }

    fn store(&self, holdings: &[Holding]) -> Result<(), AlphaflexError> {
        *self.fresh.borrow_mut() = Some(holdings.to_vec());
        *self.writes.borrow_mut() += 1;
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily closes on consecutive calendar days ending at `end`.
pub fn closes_ending(end: NaiveDate, closes: &[f64]) -> Vec<(NaiveDate, f64)> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| (end - chrono::Duration::days(n - 1 - i as i64), c))
        .collect()
}
