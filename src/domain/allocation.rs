//! Multi-factor allocation weighting.
//!
//! Four factors are blended into one weight per ticker: log market cap,
//! equal, inverse volatility and revenue. Each factor is normalized over the
//! tickers usable for that factor only. A ticker without a usable value for a
//! factor scores zero in it but stays in the portfolio. A factor that no
//! ticker can use is dropped from the blend and the remaining coefficients
//! are rescaled to sum to 1. Plain market-cap weight is computed for the
//! breakdown but not blended; the log transform replaces it to damp
//! concentration in mega caps.

use crate::domain::fundamentals::FundamentalRecord;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Factor {
    MarketCap,
    LogMarketCap,
    Equal,
    Volatility,
    Fundamental,
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Factor::MarketCap => "market_cap",
            Factor::LogMarketCap => "log_market_cap",
            Factor::Equal => "equal",
            Factor::Volatility => "volatility",
            Factor::Fundamental => "fundamental",
        };
        f.write_str(name)
    }
}

/// Blend coefficients. Defaults: 0.30 log market cap, 0.15 equal,
/// 0.15 volatility, 0.40 fundamental.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendWeights {
    pub log_market_cap: f64,
    pub equal: f64,
    pub volatility: f64,
    pub fundamental: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            log_market_cap: 0.30,
            equal: 0.15,
            volatility: 0.15,
            fundamental: 0.40,
        }
    }
}

impl BlendWeights {
    fn coefficient(&self, factor: Factor) -> f64 {
        match factor {
            Factor::MarketCap => 0.0,
            Factor::LogMarketCap => self.log_market_cap,
            Factor::Equal => self.equal,
            Factor::Volatility => self.volatility,
            Factor::Fundamental => self.fundamental,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationConfig {
    /// Countries admitted into the portfolio, compared case-insensitively.
    /// `None` or an empty list admits every record.
    pub allowed_countries: Option<Vec<String>>,
    pub blend: BlendWeights,
}

impl AllocationConfig {
    pub fn with_countries<S: Into<String>>(mut self, countries: Vec<S>) -> Self {
        let countries: Vec<String> = countries.into_iter().map(Into::into).collect();
        self.allowed_countries = if countries.is_empty() {
            None
        } else {
            Some(countries)
        };
        self
    }

    pub fn admits(&self, record: &FundamentalRecord) -> bool {
        match &self.allowed_countries {
            None => true,
            Some(list) if list.is_empty() => true,
            Some(list) => record.country.as_deref().is_some_and(|country| {
                list.iter()
                    .any(|allowed| allowed.trim().eq_ignore_ascii_case(country.trim()))
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationEntry {
    pub ticker: String,
    pub weight_percent: f64,
}

/// Per-ticker factor weights. `None` means the ticker had no usable value
/// for that factor, or the factor was undefined for the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorWeights {
    pub market_cap: Option<f64>,
    pub log_market_cap: Option<f64>,
    pub equal: f64,
    pub volatility: Option<f64>,
    pub fundamental: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    NonFinite { field: &'static str },
    Negative { field: &'static str },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::NonFinite { field } => write!(f, "non-finite {field}"),
            ExclusionReason::Negative { field } => write!(f, "negative {field}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exclusion {
    pub ticker: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    /// Sorted by descending weight, ties by ticker.
    pub entries: Vec<AllocationEntry>,
    pub breakdown: BTreeMap<String, FactorWeights>,
    /// Effective blend coefficients after dropping undefined factors.
    pub blend_used: Vec<(Factor, f64)>,
    /// Records removed from the whole output because of unusable values.
    pub excluded: Vec<Exclusion>,
    /// Records dropped by the country allow-list.
    pub filtered_out: usize,
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight_percent).sum()
    }

    pub fn weight_of(&self, ticker: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.ticker == ticker)
            .map(|e| e.weight_percent)
    }
}

pub fn compute_allocation(records: &[FundamentalRecord], config: &AllocationConfig) -> Allocation {
    let mut allocation = Allocation::default();
    let mut by_ticker: BTreeMap<&str, &FundamentalRecord> = BTreeMap::new();

    for record in records {
        if !config.admits(record) {
            allocation.filtered_out += 1;
            continue;
        }
        if let Some(reason) = exclusion_reason(record) {
            warn!("excluding {} from allocation: {}", record.ticker, reason);
            by_ticker.remove(record.ticker.as_str());
            allocation.excluded.push(Exclusion {
                ticker: record.ticker.clone(),
                reason,
            });
            continue;
        }
        by_ticker.insert(record.ticker.as_str(), record);
    }

    if by_ticker.is_empty() {
        return allocation;
    }

    let rows: Vec<&FundamentalRecord> = by_ticker.values().copied().collect();

    let market_cap = normalize(rows.iter().map(|r| Some(r.market_cap)));
    let log_market_cap = normalize(rows.iter().map(|r| Some(r.market_cap.ln_1p())));
    let equal = normalize(rows.iter().map(|_| Some(1.0)));
    let volatility = normalize(
        rows.iter()
            .map(|r| (r.volatility > 0.0).then(|| 1.0 / r.volatility)),
    );
    // undefined when total revenue is not positive, even if some records are
    let revenue_total: f64 = rows.iter().map(|r| r.revenue).sum();
    let fundamental = if revenue_total > 0.0 {
        normalize(rows.iter().map(|r| (r.revenue > 0.0).then_some(r.revenue)))
    } else {
        None
    };

    let factors = [
        (Factor::LogMarketCap, &log_market_cap),
        (Factor::Equal, &equal),
        (Factor::Volatility, &volatility),
        (Factor::Fundamental, &fundamental),
    ];

    let defined: Vec<(Factor, f64, &Vec<Option<f64>>)> = factors
        .iter()
        .filter_map(|(factor, weights)| {
            let coefficient = config.blend.coefficient(*factor);
            match weights {
                Some(w) if coefficient > 0.0 => Some((*factor, coefficient, w)),
                Some(_) => None,
                None => {
                    if coefficient > 0.0 {
                        debug!("{factor} factor undefined for this run, dropped from blend");
                    }
                    None
                }
            }
        })
        .collect();

    let coefficient_total: f64 = defined.iter().map(|(_, c, _)| c).sum();

    let blended: Vec<f64> = if coefficient_total > 0.0 && coefficient_total.is_finite() {
        allocation.blend_used = defined
            .iter()
            .map(|(f, c, _)| (*f, c / coefficient_total))
            .collect();
        (0..rows.len())
            .map(|i| {
                defined
                    .iter()
                    .map(|(_, c, w)| c / coefficient_total * w[i].unwrap_or(0.0))
                    .sum()
            })
            .collect()
    } else {
        warn!("no blend factor is usable, falling back to equal weights");
        allocation.blend_used = vec![(Factor::Equal, 1.0)];
        vec![1.0; rows.len()]
    };

    let blended_total: f64 = blended.iter().sum();
    let total_usable = blended_total > 0.0 && blended_total.is_finite();

    for (i, row) in rows.iter().enumerate() {
        let weight_percent = if total_usable {
            blended[i] / blended_total * 100.0
        } else {
            100.0 / rows.len() as f64
        };
        allocation.entries.push(AllocationEntry {
            ticker: row.ticker.clone(),
            weight_percent,
        });
        allocation.breakdown.insert(
            row.ticker.clone(),
            FactorWeights {
                market_cap: pick(&market_cap, i),
                log_market_cap: pick(&log_market_cap, i),
                equal: pick(&equal, i).unwrap_or(0.0),
                volatility: pick(&volatility, i),
                fundamental: pick(&fundamental, i),
            },
        );
    }

    allocation.entries.sort_by(|a, b| {
        b.weight_percent
            .total_cmp(&a.weight_percent)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    debug!(
        tickers = allocation.entries.len(),
        excluded = allocation.excluded.len(),
        filtered_out = allocation.filtered_out,
        "allocation computed"
    );

    allocation
}

fn exclusion_reason(record: &FundamentalRecord) -> Option<ExclusionReason> {
    let checks = [
        ("market_cap", record.market_cap),
        ("revenue", record.revenue),
        ("volatility", record.volatility),
    ];
    for (field, value) in checks {
        if !value.is_finite() {
            return Some(ExclusionReason::NonFinite { field });
        }
    }
    if record.market_cap < 0.0 {
        return Some(ExclusionReason::Negative {
            field: "market_cap",
        });
    }
    if record.volatility < 0.0 {
        return Some(ExclusionReason::Negative {
            field: "volatility",
        });
    }
    if record.volatility > 0.0 && !(1.0 / record.volatility).is_finite() {
        return Some(ExclusionReason::NonFinite {
            field: "inverse_volatility",
        });
    }
    None
}

/// Scale the present values to sum to 1. `None` when nothing is present or
/// the sum is not a positive finite number.
fn normalize<I>(raw: I) -> Option<Vec<Option<f64>>>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let raw: Vec<Option<f64>> = raw.into_iter().collect();
    let total: f64 = raw.iter().flatten().sum();
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }
    Some(raw.into_iter().map(|v| v.map(|x| x / total)).collect())
}

fn pick(weights: &Option<Vec<Option<f64>>>, i: usize) -> Option<f64> {
    weights.as_ref().and_then(|w| w[i])
}
