//! HTTP adapter for a Financial Modeling Prep style REST API.
//!
//! Endpoints used, all relative to `base_url` and authenticated with an
//! `apikey` query parameter:
//! - `stock-screener` with the filter's criteria as query parameters
//! - `profile/{ticker}` for name, country, sector and market cap
//! - `income-statement/{ticker}?limit=1` for revenue
//! - `historical-price-full/{ticker}?from=..&to=..` for daily closes
//!
//! Response parsing lives in free functions so it can be tested offline.

use crate::domain::error::AlphaflexError;
use crate::domain::filters::Criteria;
use crate::domain::fundamentals::FundamentalSnapshot;
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::{FundamentalsPort, PriceHistoryPort, TickerUniversePort};
use chrono::{Local, Months, NaiveDate};
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FmpSettings {
    pub base_url: String,
    pub api_key: String,
    pub batch_size: usize,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl FmpSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            batch_size: 10,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

pub struct FmpAdapter {
    client: reqwest::blocking::Client,
    settings: FmpSettings,
}

fn provider_error(e: impl std::fmt::Display) -> AlphaflexError {
    AlphaflexError::Provider {
        reason: e.to_string(),
    }
}

impl FmpAdapter {
    pub fn new(settings: FmpSettings) -> Result<Self, AlphaflexError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(provider_error)?;
        Ok(Self { client, settings })
    }

    fn get(&self, path: &str, query: &[(String, String)]) -> Result<String, AlphaflexError> {
        let url = format!(
            "{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        debug!("GET {url}");

        // without_url keeps the api key out of error messages
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.settings.api_key.as_str())])
            .query(query)
            .send()
            .map_err(|e| provider_error(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlphaflexError::Provider {
                reason: format!("HTTP {status} from {path}"),
            });
        }
        response.text().map_err(|e| provider_error(e.without_url()))
    }

    fn history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, f64)>, AlphaflexError> {
        let body = self.get(
            &format!("historical-price-full/{ticker}"),
            &[
                ("from".to_string(), start.to_string()),
                ("to".to_string(), end.to_string()),
            ],
        )?;
        parse_history(ticker, &body)
    }
}

impl TickerUniversePort for FmpAdapter {
    fn screen(&self, filter_name: &str, criteria: &Criteria) -> Result<Vec<String>, AlphaflexError> {
        let query: Vec<(String, String)> = criteria
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let body = self.get("stock-screener", &query)?;
        let tickers = parse_screener(&body)?;
        debug!("screener '{filter_name}' returned {} tickers", tickers.len());
        Ok(tickers)
    }
}

impl FundamentalsPort for FmpAdapter {
    fn fetch_fundamentals(&self, ticker: &str) -> Result<FundamentalSnapshot, AlphaflexError> {
        let profile = parse_profile(ticker, &self.get(&format!("profile/{ticker}"), &[])?)?;

        let revenue = match self.get(
            &format!("income-statement/{ticker}"),
            &[("limit".to_string(), "1".to_string())],
        ) {
            Ok(body) => parse_revenue(&body)?,
            Err(e) => {
                debug!("{ticker}: no income statement ({e})");
                None
            }
        };

        let end = Local::now().date_naive();
        let start = end.checked_sub_months(Months::new(12)).unwrap_or(end);
        let recent_closes = match self.history(ticker, start, end) {
            Ok(rows) => rows.into_iter().map(|(_, close)| close).collect(),
            Err(e) => {
                debug!("{ticker}: no recent closes ({e})");
                Vec::new()
            }
        };

        Ok(FundamentalSnapshot {
            revenue,
            recent_closes,
            ..profile
        })
    }

    fn fetch_many(
        &self,
        tickers: &[String],
    ) -> Vec<(String, Result<FundamentalSnapshot, AlphaflexError>)> {
        fetch_in_batches(
            tickers,
            self.settings.batch_size,
            self.settings.max_retries,
            self.settings.retry_delay,
            |ticker| self.fetch_fundamentals(ticker),
        )
    }
}

impl PriceHistoryPort for FmpAdapter {
    fn fetch_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, AlphaflexError> {
        Ok(PriceSeries::new(self.history(ticker, start, end)?))
    }
}

/// Transport and HTTP failures are transient; a missing entity or a body
/// that does not parse is not.
fn is_retryable(err: &AlphaflexError) -> bool {
    matches!(err, AlphaflexError::Provider { .. })
}

/// Fetch tickers in chunks of `batch_size`. Within a chunk, tickers that
/// failed with a retryable error are fetched again, up to `max_retries`
/// attempts in total, sleeping `retry_delay` between attempts. Output
/// order follows `tickers`.
pub fn fetch_in_batches<T, F>(
    tickers: &[String],
    batch_size: usize,
    max_retries: usize,
    retry_delay: Duration,
    mut fetch: F,
) -> Vec<(String, Result<T, AlphaflexError>)>
where
    F: FnMut(&str) -> Result<T, AlphaflexError>,
{
    let max_retries = max_retries.max(1);
    let mut results = Vec::with_capacity(tickers.len());

    for chunk in tickers.chunks(batch_size.max(1)) {
        let mut outcomes: Vec<Option<Result<T, AlphaflexError>>> =
            chunk.iter().map(|_| None).collect();

        for attempt in 1..=max_retries {
            let mut failed = 0;
            for (slot, ticker) in outcomes.iter_mut().zip(chunk) {
                let pending = match slot {
                    None => true,
                    Some(Err(e)) => is_retryable(e),
                    Some(Ok(_)) => false,
                };
                if !pending {
                    continue;
                }
                let outcome = fetch(ticker);
                if outcome.as_ref().is_err_and(is_retryable) {
                    failed += 1;
                }
                *slot = Some(outcome);
            }

            if failed == 0 || attempt == max_retries {
                break;
            }
            warn!(
                "{failed} of {} tickers failed (attempt {attempt}/{max_retries}), retrying in {}s",
                chunk.len(),
                retry_delay.as_secs()
            );
            thread::sleep(retry_delay);
        }

        for (ticker, outcome) in chunk.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                Err(AlphaflexError::Provider {
                    reason: "not fetched".into(),
                })
            });
            results.push((ticker.clone(), outcome));
        }
    }

    results
}

fn json_error(e: serde_json::Error) -> AlphaflexError {
    AlphaflexError::MalformedResponse {
        reason: e.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ScreenerRow {
    symbol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRow {
    company_name: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    #[serde(alias = "marketCap")]
    mkt_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IncomeRow {
    revenue: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    historical: Vec<HistoryRow>,
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    date: String,
    close: Option<f64>,
}

pub fn parse_screener(body: &str) -> Result<Vec<String>, AlphaflexError> {
    let rows: Vec<ScreenerRow> = serde_json::from_str(body).map_err(json_error)?;
    Ok(rows.into_iter().map(|r| r.symbol).collect())
}

/// Full country name for the ISO codes the profile endpoint returns.
fn country_name(raw: String) -> String {
    match raw.trim() {
        "US" => "United States".to_string(),
        "CA" => "Canada".to_string(),
        "GB" => "United Kingdom".to_string(),
        "DE" => "Germany".to_string(),
        "JP" => "Japan".to_string(),
        "CN" => "China".to_string(),
        _ => raw,
    }
}

pub fn parse_profile(ticker: &str, body: &str) -> Result<FundamentalSnapshot, AlphaflexError> {
    let rows: Vec<ProfileRow> = serde_json::from_str(body).map_err(json_error)?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| AlphaflexError::DataUnavailable {
            ticker: ticker.to_string(),
            reason: "empty profile".into(),
        })?;

    Ok(FundamentalSnapshot {
        ticker: ticker.to_string(),
        name: row.company_name,
        country: row.country.map(country_name),
        sector: row.sector.filter(|s| !s.is_empty()),
        market_cap: row.mkt_cap,
        revenue: None,
        recent_closes: Vec::new(),
    })
}

/// Revenue of the most recent income statement, if any.
pub fn parse_revenue(body: &str) -> Result<Option<f64>, AlphaflexError> {
    let rows: Vec<IncomeRow> = serde_json::from_str(body).map_err(json_error)?;
    Ok(rows.into_iter().next().and_then(|r| r.revenue))
}

/// Daily closes, date-ascending. Rows without a close or with an
/// unparseable date are skipped.
pub fn parse_history(ticker: &str, body: &str) -> Result<Vec<(NaiveDate, f64)>, AlphaflexError> {
    let response: HistoryResponse = serde_json::from_str(body).map_err(json_error)?;
    if response.historical.is_empty() {
        return Err(AlphaflexError::DataUnavailable {
            ticker: ticker.to_string(),
            reason: "no price history".into(),
        });
    }

    let mut rows: Vec<(NaiveDate, f64)> = response
        .historical
        .into_iter()
        .filter_map(|row| {
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").ok()?;
            Some((date, row.close?))
        })
        .collect();
    rows.sort_by_key(|(date, _)| *date);
    Ok(rows)
}
