//! Symbolic lookback periods and their trading-day table.
//!
//! The same table sizes the price-fetch window and annualizes volatility.

use crate::domain::error::AlphaflexError;
use crate::domain::price_series::PriceSeries;
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// Calendar days fetched for `1d`; `5d` fetches twice as many.
const SHORT_LOOKBACK_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    ThreeYears,
    FiveYears,
    YearToDate,
}

/// A period resolved against an as-of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub period: Period,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub trading_days: usize,
}

impl Period {
    pub const ALL: [Period; 10] = [
        Period::OneDay,
        Period::FiveDays,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
        Period::TwoYears,
        Period::ThreeYears,
        Period::FiveYears,
        Period::YearToDate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::ThreeYears => "3y",
            Period::FiveYears => "5y",
            Period::YearToDate => "ytd",
        }
    }

    /// Approximate trading days covered. `ytd` counts weekdays from 1 January
    /// through `as_of`.
    pub fn trading_days(&self, as_of: NaiveDate) -> usize {
        match self {
            Period::OneDay => 1,
            Period::FiveDays => 5,
            Period::OneMonth => 21,
            Period::ThreeMonths => 63,
            Period::SixMonths => 126,
            Period::OneYear => TRADING_DAYS_PER_YEAR,
            Period::TwoYears => 504,
            Period::ThreeYears => 756,
            Period::FiveYears => 1260,
            Period::YearToDate => weekdays_between(year_start(as_of), as_of).max(1),
        }
    }

    /// First calendar date of the fetch window ending at `as_of`.
    pub fn start_date(&self, as_of: NaiveDate) -> NaiveDate {
        let back = match self {
            // wide enough to reach the previous session over weekends and holidays
            Period::OneDay => as_of.checked_sub_days(Days::new(SHORT_LOOKBACK_DAYS)),
            Period::FiveDays => as_of.checked_sub_days(Days::new(2 * SHORT_LOOKBACK_DAYS)),
            Period::OneMonth => as_of.checked_sub_months(Months::new(1)),
            Period::ThreeMonths => as_of.checked_sub_months(Months::new(3)),
            Period::SixMonths => as_of.checked_sub_months(Months::new(6)),
            Period::OneYear => as_of.checked_sub_months(Months::new(12)),
            Period::TwoYears => as_of.checked_sub_months(Months::new(24)),
            Period::ThreeYears => as_of.checked_sub_months(Months::new(36)),
            Period::FiveYears => as_of.checked_sub_months(Months::new(60)),
            Period::YearToDate => Some(year_start(as_of)),
        };
        back.unwrap_or(NaiveDate::MIN)
    }

    /// Short periods count sessions rather than calendar days: `1d` is the
    /// last two closes on or before `as_of`, `5d` the last six.
    pub fn max_closes(&self) -> Option<usize> {
        match self {
            Period::OneDay => Some(2),
            Period::FiveDays => Some(6),
            _ => None,
        }
    }

    pub fn window(&self, as_of: NaiveDate) -> PeriodWindow {
        PeriodWindow {
            period: *self,
            start: self.start_date(as_of),
            end: as_of,
            trading_days: self.trading_days(as_of),
        }
    }
}

impl PeriodWindow {
    /// The part of `series` this window prices.
    pub fn select(&self, series: &PriceSeries) -> PriceSeries {
        let inside = series.within(self.start, self.end);
        match self.period.max_closes() {
            Some(n) => inside.tail(n),
            None => inside,
        }
    }
}

impl FromStr for Period {
    type Err = AlphaflexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Period::ALL
            .iter()
            .find(|p| p.as_str() == trimmed)
            .copied()
            .ok_or_else(|| AlphaflexError::InvalidPeriod(s.to_string()))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn year_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date)
}

fn weekdays_between(start: NaiveDate, end: NaiveDate) -> usize {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count()
}
