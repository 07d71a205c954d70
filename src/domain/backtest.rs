//! Buy-and-hold backtest of a weighted allocation over a lookback period.
//!
//! Tickers whose prices cannot be fetched, or that have fewer than two valid
//! closes inside the window, are dropped for this run and the remaining
//! weights are rescaled to sum to 1. With no survivors the report is a
//! flagged degenerate result (ending value 0, return -100%) unless the
//! caller asked for strict mode.

use crate::domain::allocation::AllocationEntry;
use crate::domain::error::AlphaflexError;
use crate::domain::metrics::RiskMetrics;
use crate::domain::period::{Period, PeriodWindow};
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::PriceHistoryPort;
use chrono::NaiveDate;
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_RISK_FREE_RATE_PCT: f64 = 4.52;

#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub initial_investment: f64,
    pub period: Period,
    /// Annual risk-free rate in percent, e.g. 4.52.
    pub risk_free_rate_pct: f64,
    pub as_of: NaiveDate,
    /// Fail with `NoUsableData` instead of returning a zero-survivor report.
    pub strict: bool,
}

impl BacktestParams {
    pub fn new(initial_investment: f64, period: Period, as_of: NaiveDate) -> Self {
        Self {
            initial_investment,
            period,
            risk_free_rate_pct: DEFAULT_RISK_FREE_RATE_PCT,
            as_of,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    Unavailable(String),
    InsufficientPoints { points: usize },
    InvalidWeight { weight_percent: f64 },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Unavailable(reason) => write!(f, "prices unavailable: {reason}"),
            DropReason::InsufficientPoints { points } => {
                write!(f, "only {points} valid closes in window")
            }
            DropReason::InvalidWeight { weight_percent } => {
                write!(f, "unusable weight {weight_percent}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedTicker {
    pub ticker: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionResult {
    pub ticker: String,
    /// Renormalized weight, a fraction of the investment.
    pub weight: f64,
    pub initial_value: f64,
    pub final_value: f64,
    pub percentage_change: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub period: Period,
    pub window: PeriodWindow,
    pub initial_investment: f64,
    pub ending_value: f64,
    pub percentage_return: f64,
    pub annualized_volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    /// No ticker had usable prices; the figures above are degenerate.
    pub zero_survivor: bool,
    pub positions: Vec<PositionResult>,
    pub dropped: Vec<DroppedTicker>,
}

struct Survivor {
    ticker: String,
    weight_percent: f64,
    series: PriceSeries,
}

pub fn run_backtest<F>(
    allocation: &[AllocationEntry],
    params: &BacktestParams,
    mut price_lookup: F,
) -> Result<BacktestReport, AlphaflexError>
where
    F: FnMut(&str, &PeriodWindow) -> Result<PriceSeries, AlphaflexError>,
{
    let investment = params.initial_investment;
    if !(investment.is_finite() && investment > 0.0) {
        return Err(AlphaflexError::InvalidInvestment(investment));
    }

    let window = params.period.window(params.as_of);
    let mut survivors: Vec<Survivor> = Vec::with_capacity(allocation.len());
    let mut dropped: Vec<DroppedTicker> = Vec::new();

    for entry in allocation {
        let weight_percent = entry.weight_percent;
        if !(weight_percent.is_finite() && weight_percent > 0.0) {
            dropped.push(DroppedTicker {
                ticker: entry.ticker.clone(),
                reason: DropReason::InvalidWeight { weight_percent },
            });
            continue;
        }

        let series = match price_lookup(&entry.ticker, &window) {
            Ok(series) => window.select(&series),
            Err(e) => {
                let err = e.for_ticker(&entry.ticker);
                warn!("dropping {} from backtest: {}", entry.ticker, err);
                dropped.push(DroppedTicker {
                    ticker: entry.ticker.clone(),
                    reason: DropReason::Unavailable(err.to_string()),
                });
                continue;
            }
        };

        if !series.is_usable() {
            warn!(
                "dropping {} from backtest: {} valid closes between {} and {}",
                entry.ticker,
                series.len(),
                window.start,
                window.end
            );
            dropped.push(DroppedTicker {
                ticker: entry.ticker.clone(),
                reason: DropReason::InsufficientPoints {
                    points: series.len(),
                },
            });
            continue;
        }

        survivors.push(Survivor {
            ticker: entry.ticker.clone(),
            weight_percent,
            series,
        });
    }

    if survivors.is_empty() {
        if params.strict {
            return Err(AlphaflexError::NoUsableData {
                requested: allocation.len(),
            });
        }
        warn!(
            "no usable price data for any of {} tickers, returning zero-survivor report",
            allocation.len()
        );
        return Ok(BacktestReport {
            period: params.period,
            window,
            initial_investment: investment,
            ending_value: 0.0,
            percentage_return: -100.0,
            annualized_volatility: None,
            sharpe_ratio: None,
            zero_survivor: true,
            positions: Vec::new(),
            dropped,
        });
    }

    let weight_total: f64 = survivors.iter().map(|s| s.weight_percent).sum();

    let mut positions = Vec::with_capacity(survivors.len());
    let mut weighted_series: Vec<(f64, &PriceSeries)> = Vec::with_capacity(survivors.len());

    for survivor in &survivors {
        let weight = survivor.weight_percent / weight_total;
        let initial_value = weight * investment;
        let growth = survivor.series.growth_ratio().unwrap_or(1.0);
        let final_value = initial_value * growth;

        debug!(
            ticker = %survivor.ticker,
            weight,
            growth,
            "position valued"
        );

        positions.push(PositionResult {
            ticker: survivor.ticker.clone(),
            weight,
            initial_value,
            final_value,
            percentage_change: (growth - 1.0) * 100.0,
        });
        weighted_series.push((weight, &survivor.series));
    }

    let ending_value: f64 = positions.iter().map(|p| p.final_value).sum();
    let percentage_return = (ending_value - investment) / investment * 100.0;

    let risk = RiskMetrics::compute(
        &weighted_series,
        window.trading_days,
        params.risk_free_rate_pct,
    );

    info!(
        "backtest {}: {} of {} tickers priced, {:.2} -> {:.2} ({:+.2}%)",
        params.period,
        positions.len(),
        allocation.len(),
        investment,
        ending_value,
        percentage_return
    );

    Ok(BacktestReport {
        period: params.period,
        window,
        initial_investment: investment,
        ending_value,
        percentage_return,
        annualized_volatility: risk.annualized_volatility,
        sharpe_ratio: risk.sharpe_ratio,
        zero_survivor: false,
        positions,
        dropped,
    })
}

/// `run_backtest` with prices fetched from a port over the resolved window.
pub fn run_backtest_with_port(
    allocation: &[AllocationEntry],
    params: &BacktestParams,
    prices: &dyn PriceHistoryPort,
) -> Result<BacktestReport, AlphaflexError> {
    run_backtest(allocation, params, |ticker, window| {
        prices.fetch_closes(ticker, window.start, window.end)
    })
}
