//! Portfolio construction pipeline: screen, fetch fundamentals, allocate,
//! and serve from the allocation cache while it is fresh.

use std::collections::HashMap;
use std::time::SystemTime;

use tracing::{info, warn};

use super::allocation::{AllocationConfig, AllocationEntry, compute_allocation};
use super::error::AlphaflexError;
use super::filters::FilterSet;
use super::fundamentals::{FundamentalRecord, collect_fundamentals};
use super::universe::resolve_universe;
use crate::ports::cache_port::AllocationCachePort;
use crate::ports::data_port::{FundamentalsPort, TickerUniversePort};

/// One row of the allocation table, as cached.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub sector: Option<String>,
    pub market_cap: f64,
    pub revenue: f64,
    pub volatility: f64,
    pub allocation_weight_percent: f64,
}

impl Holding {
    fn from_record(record: &FundamentalRecord, weight_percent: f64) -> Self {
        Holding {
            ticker: record.ticker.clone(),
            name: record.name.clone(),
            country: record.country.clone(),
            sector: record.sector.clone(),
            market_cap: record.market_cap,
            revenue: record.revenue,
            volatility: record.volatility,
            allocation_weight_percent: weight_percent,
        }
    }

    pub fn entry(&self) -> AllocationEntry {
        AllocationEntry {
            ticker: self.ticker.clone(),
            weight_percent: self.allocation_weight_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortfolioSource {
    Cache,
    Computed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub holdings: Vec<Holding>,
    pub source: PortfolioSource,
    /// Tickers whose fundamentals could not be fetched.
    pub unavailable: usize,
    /// Records removed by the allocation engine for unusable values.
    pub excluded: usize,
    /// Records dropped by the country allow-list.
    pub filtered_out: usize,
}

impl Portfolio {
    fn empty(source: PortfolioSource) -> Self {
        Portfolio {
            holdings: Vec::new(),
            source,
            unavailable: 0,
            excluded: 0,
            filtered_out: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn entries(&self) -> Vec<AllocationEntry> {
        self.holdings.iter().map(Holding::entry).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.holdings
            .iter()
            .map(|h| h.allocation_weight_percent)
            .sum()
    }
}

/// Allocate over an explicit ticker list.
pub fn build_from_tickers(
    fundamentals: &dyn FundamentalsPort,
    tickers: &[String],
    config: &AllocationConfig,
) -> Portfolio {
    if tickers.is_empty() {
        warn!("no tickers to allocate");
        return Portfolio::empty(PortfolioSource::Computed);
    }

    info!("fetching fundamentals for {} tickers", tickers.len());
    let collection = collect_fundamentals(fundamentals, tickers);
    if collection.records.is_empty() {
        warn!("no fundamentals fetched for any ticker");
        return Portfolio {
            unavailable: collection.unavailable.len(),
            ..Portfolio::empty(PortfolioSource::Computed)
        };
    }

    let allocation = compute_allocation(&collection.records, config);
    if allocation.is_empty() {
        warn!(
            "no ticker survived allocation ({} outside the country allow-list, {} excluded)",
            allocation.filtered_out,
            allocation.excluded_count()
        );
    }

    let by_ticker: HashMap<&str, &FundamentalRecord> = collection
        .records
        .iter()
        .map(|r| (r.ticker.as_str(), r))
        .collect();

    let holdings = allocation
        .entries
        .iter()
        .filter_map(|entry| {
            by_ticker
                .get(entry.ticker.as_str())
                .map(|record| Holding::from_record(record, entry.weight_percent))
        })
        .collect();

    Portfolio {
        holdings,
        source: PortfolioSource::Computed,
        unavailable: collection.unavailable.len(),
        excluded: allocation.excluded_count(),
        filtered_out: allocation.filtered_out,
    }
}

/// Screen with `filters`, then allocate over the union of the results.
pub fn calculate_portfolio(
    universe: &dyn TickerUniversePort,
    fundamentals: &dyn FundamentalsPort,
    filters: &FilterSet,
    config: &AllocationConfig,
) -> Portfolio {
    let resolved = resolve_universe(universe, filters);
    if resolved.is_empty() {
        warn!("no tickers retrieved from {} filters", filters.len());
        return Portfolio::empty(PortfolioSource::Computed);
    }
    build_from_tickers(fundamentals, &resolved.tickers, config)
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshPolicy {
    pub now: SystemTime,
    pub force_refresh: bool,
}

impl RefreshPolicy {
    pub fn at(now: SystemTime) -> Self {
        Self {
            now,
            force_refresh: false,
        }
    }
}

/// Serve the cached allocation while fresh, otherwise recompute it and cache
/// non-empty results. An unreadable or unwritable cache is logged and
/// treated as absent.
pub fn get_portfolio(
    cache: &dyn AllocationCachePort,
    universe: &dyn TickerUniversePort,
    fundamentals: &dyn FundamentalsPort,
    filters: &FilterSet,
    config: &AllocationConfig,
    policy: RefreshPolicy,
) -> Result<Portfolio, AlphaflexError> {
    if !policy.force_refresh {
        match cache.load_fresh(policy.now) {
            Ok(Some(holdings)) => {
                info!("loaded {} holdings from cache", holdings.len());
                return Ok(Portfolio {
                    holdings,
                    ..Portfolio::empty(PortfolioSource::Cache)
                });
            }
            Ok(None) => info!("cache absent or stale, recomputing portfolio"),
            Err(e) => warn!("ignoring unreadable cache: {e}"),
        }
    }

    let portfolio = calculate_portfolio(universe, fundamentals, filters, config);
    if !portfolio.is_empty() {
        if let Err(e) = cache.store(&portfolio.holdings) {
            warn!("failed to write cache: {e}");
        } else {
            info!("cached {} holdings", portfolio.holdings.len());
        }
    }
    Ok(portfolio)
}
