//! Ticker universe: the union of every filter's screen results.

use crate::domain::filters::FilterSet;
use crate::ports::data_port::TickerUniversePort;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    #[error("invalid ticker: {0}")]
    InvalidTicker(String),
}

/// Parse an explicit comma-separated ticker list, e.g. from the command line.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        if token.trim().is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = normalize_ticker(token)
            .ok_or_else(|| UniverseError::InvalidTicker(token.trim().to_string()))?;
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

/// Trimmed, uppercased ticker. `None` for an empty token or one that could
/// name a path outside a data directory.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_safe_ticker(trimmed) {
        Some(trimmed.to_uppercase())
    } else {
        None
    }
}

pub fn is_safe_ticker(ticker: &str) -> bool {
    !ticker.is_empty() && !ticker.contains(['/', '\\']) && !ticker.contains("..")
}

#[derive(Debug, Clone)]
pub struct SkippedFilter {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// Sorted, unique tickers.
    pub tickers: Vec<String>,
    pub skipped: Vec<SkippedFilter>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Screen every filter and union the results. A filter whose screen fails is
/// logged and skipped; the others still run.
pub fn resolve_universe(port: &dyn TickerUniversePort, filters: &FilterSet) -> Universe {
    let mut tickers: BTreeSet<String> = BTreeSet::new();
    let mut skipped = Vec::new();

    for (name, criteria) in filters.iter() {
        info!("applying filter '{}' ({} criteria)", name, criteria.len());
        match port.screen(name, criteria) {
            Ok(found) => {
                let before = tickers.len();
                tickers.extend(found.iter().filter_map(|t| normalize_ticker(t)));
                info!(
                    "  {}: {} tickers ({} new)",
                    name,
                    found.len(),
                    tickers.len() - before
                );
            }
            Err(e) => {
                warn!("skipping filter '{}': {}", name, e);
                skipped.push(SkippedFilter {
                    name: name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Universe {
        tickers: tickers.into_iter().collect(),
        skipped,
    }
}
