//! Daily close-price series.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Minimum number of valid closes for a series to take part in a backtest.
pub const MIN_VALID_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Strictly date-ascending closes. Construction drops NaN, infinite and
/// non-positive closes; for a repeated date the last value supplied wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let by_date: BTreeMap<NaiveDate, f64> = points
            .into_iter()
            .filter(|(_, close)| close.is_finite() && *close > 0.0)
            .collect();
        Self {
            points: by_date
                .into_iter()
                .map(|(date, close)| PricePoint { date, close })
                .collect(),
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_usable(&self) -> bool {
        self.points.len() >= MIN_VALID_POINTS
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Points with `start <= date <= end`.
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        PriceSeries {
            points: self
                .points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect(),
        }
    }

    /// The last `n` points.
    pub fn tail(&self, n: usize) -> PriceSeries {
        let skip = self.points.len().saturating_sub(n);
        PriceSeries {
            points: self.points[skip..].to_vec(),
        }
    }

    /// last close / first close. `None` for an unusable series.
    pub fn growth_ratio(&self) -> Option<f64> {
        if !self.is_usable() {
            return None;
        }
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => Some(last.close / first.close),
            _ => None,
        }
    }

    /// Simple returns `close[t] / close[t-1] - 1`, keyed by the date of `t`.
    pub fn daily_returns(&self) -> Vec<(NaiveDate, f64)> {
        self.points
            .windows(2)
            .map(|w| (w[1].date, w[1].close / w[0].close - 1.0))
            .collect()
    }
}
