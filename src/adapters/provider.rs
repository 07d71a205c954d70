//! The configured market data provider, dispatching to one concrete adapter.

use crate::adapters::csv_adapter::CsvAdapter;
#[cfg(feature = "fmp")]
use crate::adapters::fmp_adapter::{FmpAdapter, FmpSettings};
use crate::domain::error::AlphaflexError;
use crate::domain::filters::Criteria;
use crate::domain::fundamentals::FundamentalSnapshot;
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::{FundamentalsPort, PriceHistoryPort, TickerUniversePort};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Csv,
    Fmp,
}

impl std::str::FromStr for ProviderKind {
    type Err = AlphaflexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ProviderKind::Csv),
            "fmp" => Ok(ProviderKind::Fmp),
            other => Err(AlphaflexError::ConfigInvalid {
                section: "provider".into(),
                key: "kind".into(),
                reason: format!("unknown provider '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub data_dir: Option<PathBuf>,
    pub base_url: String,
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

pub enum MarketDataProvider {
    Csv(CsvAdapter),
    #[cfg(feature = "fmp")]
    Fmp(FmpAdapter),
}

impl MarketDataProvider {
    pub fn open(settings: &ProviderSettings) -> Result<Self, AlphaflexError> {
        match settings.kind {
            ProviderKind::Csv => {
                let dir = settings
                    .data_dir
                    .clone()
                    .ok_or_else(|| AlphaflexError::ConfigMissing {
                        section: "provider".into(),
                        key: "data_dir".into(),
                    })?;
                Ok(MarketDataProvider::Csv(CsvAdapter::new(dir)))
            }
            ProviderKind::Fmp => Self::open_fmp(settings),
        }
    }

    #[cfg(feature = "fmp")]
    fn open_fmp(settings: &ProviderSettings) -> Result<Self, AlphaflexError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| AlphaflexError::ConfigMissing {
                section: "provider".into(),
                key: "api_key".into(),
            })?;
        let adapter = FmpAdapter::new(FmpSettings {
            base_url: settings.base_url.clone(),
            api_key,
            batch_size: settings.batch_size,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        })?;
        Ok(MarketDataProvider::Fmp(adapter))
    }

    #[cfg(not(feature = "fmp"))]
    fn open_fmp(_: &ProviderSettings) -> Result<Self, AlphaflexError> {
        Err(AlphaflexError::ConfigInvalid {
            section: "provider".into(),
            key: "kind".into(),
            reason: "built without the fmp feature".into(),
        })
    }
}

impl TickerUniversePort for MarketDataProvider {
    fn screen(&self, filter_name: &str, criteria: &Criteria) -> Result<Vec<String>, AlphaflexError> {
        match self {
            MarketDataProvider::Csv(a) => a.screen(filter_name, criteria),
            #[cfg(feature = "fmp")]
            MarketDataProvider::Fmp(a) => a.screen(filter_name, criteria),
        }
    }
}

impl FundamentalsPort for MarketDataProvider {
    fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalSnapshot, AlphaflexError> {
        match self {
            MarketDataProvider::Csv(a) => a.fetch_fundamentals(ticker),
            #[cfg(feature = "fmp")]
            MarketDataProvider::Fmp(a) => a.fetch_fundamentals(ticker),
        }
    }

    fn fetch_many(
        &self,
        tickers: &[String],
    ) -> Vec<(String, Result<FundamentalSnapshot, AlphaflexError>)> {
        match self {
            MarketDataProvider::Csv(a) => a.fetch_many(tickers),
            #[cfg(feature = "fmp")]
            MarketDataProvider::Fmp(a) => a.fetch_many(tickers),
        }
    }
}

impl PriceHistoryPort for MarketDataProvider {
    fn fetch_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AlphaflexError> {
        match self {
            MarketDataProvider::Csv(a) => a.fetch_closes(ticker, start, end),
            #[cfg(feature = "fmp")]
            MarketDataProvider::Fmp(a) => a.fetch_closes(ticker, start, end),
        }
    }
}
