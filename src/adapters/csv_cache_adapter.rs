//! Allocation cache stored as a CSV file. Freshness is the file's
//! modification time.

use crate::domain::error::AlphaflexError;
use crate::domain::portfolio::Holding;
use crate::ports::cache_port::AllocationCachePort;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::debug;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

pub struct CsvCacheAdapter {
    path: PathBuf,
    max_age: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    ticker: String,
    name: Option<String>,
    country: Option<String>,
    sector: Option<String>,
    market_cap: f64,
    revenue: f64,
    volatility: f64,
    allocation_weight_percent: f64,
}

impl From<&Holding> for CacheRow {
    fn from(h: &Holding) -> Self {
        CacheRow {
            ticker: h.ticker.clone(),
            name: h.name.clone(),
            country: h.country.clone(),
            sector: h.sector.clone(),
            market_cap: h.market_cap,
            revenue: h.revenue,
            volatility: h.volatility,
            allocation_weight_percent: h.allocation_weight_percent,
        }
    }
}

impl From<CacheRow> for Holding {
    fn from(row: CacheRow) -> Self {
        Holding {
            ticker: row.ticker,
            name: row.name,
            country: row.country,
            sector: row.sector,
            market_cap: row.market_cap,
            revenue: row.revenue,
            volatility: row.volatility,
            allocation_weight_percent: row.allocation_weight_percent,
        }
    }
}

fn cache_error(e: impl std::fmt::Display) -> AlphaflexError {
    AlphaflexError::Cache {
        reason: e.to_string(),
    }
}

impl CsvCacheAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_age: DEFAULT_MAX_AGE,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Age of the cache file at `now`. A modification time in the future
    /// counts as age zero.
    fn age(&self, now: SystemTime) -> Result<Option<Duration>, AlphaflexError> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                let modified = meta.modified()?;
                Ok(Some(now.duration_since(modified).unwrap_or(Duration::ZERO)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl AllocationCachePort for CsvCacheAdapter {
    fn load_fresh(&self, now: SystemTime) -> Result<Option<Vec<Holding>>, AlphaflexError> {
        let age = match self.age(now)? {
            Some(age) => age,
            None => {
                debug!("no cache at {}", self.path.display());
                return Ok(None);
            }
        };
        if age >= self.max_age {
            debug!(
                "cache at {} is {}s old (max {}s)",
                self.path.display(),
                age.as_secs(),
                self.max_age.as_secs()
            );
            return Ok(None);
        }

        let mut rdr = csv::Reader::from_path(&self.path).map_err(cache_error)?;
        let holdings = rdr
            .deserialize::<CacheRow>()
            .map(|row| row.map(Holding::from).map_err(cache_error))
            .collect::<Result<Vec<_>, _>>()?;

        if holdings.is_empty() {
            return Ok(None);
        }
        Ok(Some(holdings))
    }

    /// Writes to a sibling temp file and renames it over the cache.
    fn store(&self, holdings: &[Holding]) -> Result<(), AlphaflexError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut wtr = csv::Writer::from_path(&tmp).map_err(cache_error)?;
            for holding in holdings {
                wtr.serialize(CacheRow::from(holding)).map_err(cache_error)?;
            }
            wtr.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn holdings() -> Vec<Holding> {
        vec![
            Holding {
                ticker: "AAPL".into(),
                name: Some("Apple Inc.".into()),
                country: Some("United States".into()),
                sector: Some("Technology".into()),
                market_cap: 3.0e12,
                revenue: 3.83e11,
                volatility: 12.345678901234567,
                allocation_weight_percent: 61.803398874989485,
            },
            Holding {
                ticker: "SHOP".into(),
                name: None,
                country: Some("Canada".into()),
                sector: None,
                market_cap: 1.0e11,
                revenue: 7.0e9,
                volatility: 0.1,
                allocation_weight_percent: 38.196601125010515,
            },
        ]
    }

    #[test]
    fn missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCacheAdapter::new(dir.path().join("allocation.csv"));
        assert_eq!(cache.load_fresh(SystemTime::now()).unwrap(), None);
    }

    #[test]
    fn stored_holdings_round_trip_exactly() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCacheAdapter::new(dir.path().join("nested/allocation.csv"));
        cache.store(&holdings()).unwrap();

        let loaded = cache.load_fresh(SystemTime::now()).unwrap().unwrap();
        assert_eq!(loaded, holdings());
    }

    #[test]
    fn cache_goes_stale_after_max_age() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCacheAdapter::new(dir.path().join("allocation.csv"))
            .with_max_age(Duration::from_secs(3600));
        cache.store(&holdings()).unwrap();

        let later = SystemTime::now() + Duration::from_secs(2 * 3600);
        assert_eq!(cache.load_fresh(later).unwrap(), None);
    }

    #[test]
    fn store_overwrites_previous_contents() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCacheAdapter::new(dir.path().join("allocation.csv"));
        cache.store(&holdings()).unwrap();
        cache.store(&holdings()[..1]).unwrap();

        let loaded = cache.load_fresh(SystemTime::now()).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ticker, "AAPL");
    }

    #[test]
    fn corrupt_file_is_cache_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("allocation.csv");
        fs::write(&path, "ticker,market_cap\nAAPL,not-a-number\n").unwrap();

        let cache = CsvCacheAdapter::new(path);
        let err = cache.load_fresh(SystemTime::now()).unwrap_err();
        assert!(matches!(err, AlphaflexError::Cache { .. }));
    }
}
