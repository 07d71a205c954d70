//! Portfolio risk metrics: daily-return series, annualized volatility and
//! Sharpe ratio.

use super::period::TRADING_DAYS_PER_YEAR;
use super::price_series::PriceSeries;
use chrono::NaiveDate;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskMetrics {
    /// Weighted portfolio return per date, date-ascending.
    pub daily_returns: Vec<(NaiveDate, f64)>,
    pub mean_daily_return: Option<f64>,
    pub annualized_volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
}

impl RiskMetrics {
    /// `positions` pairs each series with its weight as a fraction of the
    /// portfolio. `risk_free_rate_pct` is an annual rate in percent.
    pub fn compute(
        positions: &[(f64, &PriceSeries)],
        trading_days: usize,
        risk_free_rate_pct: f64,
    ) -> Self {
        let daily_returns = portfolio_daily_returns(positions);
        let values: Vec<f64> = daily_returns.iter().map(|(_, r)| *r).collect();

        let mean_daily_return = if values.is_empty() {
            None
        } else {
            Some(values.iter().mean())
        };
        let annualized_volatility =
            sample_std_dev(&values).map(|sd| annualize_volatility(sd, trading_days));
        let sharpe_ratio = match (mean_daily_return, annualized_volatility) {
            (Some(mean), Some(vol)) => sharpe_ratio(mean, risk_free_rate_pct, vol),
            _ => None,
        };

        RiskMetrics {
            daily_returns,
            mean_daily_return,
            annualized_volatility,
            sharpe_ratio,
        }
    }
}

/// Sum of weighted simple returns per date across all positions. A position
/// with no return on a date contributes nothing to that date.
pub fn portfolio_daily_returns(positions: &[(f64, &PriceSeries)]) -> Vec<(NaiveDate, f64)> {
    let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (weight, series) in positions {
        for (date, ret) in series.daily_returns() {
            *by_date.entry(date).or_insert(0.0) += weight * ret;
        }
    }
    by_date.into_iter().collect()
}

/// Sample (n - 1) standard deviation; `None` below two observations.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let sd = values.iter().std_dev();
    sd.is_finite().then_some(sd)
}

/// Scale a daily standard deviation by sqrt(252 / trading_days).
pub fn annualize_volatility(daily_std_dev: f64, trading_days: usize) -> f64 {
    let days = trading_days.max(1) as f64;
    daily_std_dev * (TRADING_DAYS_PER_YEAR as f64 / days).sqrt()
}

/// (mean daily return - rf / 100) / annualized volatility. `None` when the
/// volatility is zero.
pub fn sharpe_ratio(
    mean_daily_return: f64,
    risk_free_rate_pct: f64,
    annualized_volatility: f64,
) -> Option<f64> {
    if annualized_volatility == 0.0 || !annualized_volatility.is_finite() {
        return None;
    }
    let ratio = (mean_daily_return - risk_free_rate_pct / 100.0) / annualized_volatility;
    ratio.is_finite().then_some(ratio)
}
