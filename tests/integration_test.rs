mod common;

use alphaflex::adapters::csv_cache_adapter::CsvCacheAdapter;
use alphaflex::cli::{self, OutputPaths, PortfolioRequest};
use alphaflex::domain::allocation::AllocationConfig;
use alphaflex::domain::backtest::{BacktestParams, run_backtest_with_port};
use alphaflex::domain::error::AlphaflexError;
use alphaflex::domain::filters::{Criteria, FilterSet};
use alphaflex::domain::period::Period;
use alphaflex::domain::portfolio::{PortfolioSource, RefreshPolicy, get_portfolio};
use alphaflex::ports::report_port::ReportPort;
use approx::assert_relative_eq;
use common::*;
use std::time::{Duration, SystemTime};

fn filters(names: &[&str]) -> FilterSet {
    let mut set = FilterSet::new();
    for name in names {
        set.insert(*name, Criteria::new());
    }
    set
}

fn north_america() -> AllocationConfig {
    AllocationConfig::default().with_countries(vec!["United States", "Canada"])
}

fn market() -> MockMarketData {
    MockMarketData::new()
        .with_screen("Growth", &["AAA", "BBB"])
        .with_screen("Value", &["BBB", "CCC", "TSE"])
        .with_company("AAA", "United States", 1.0e9, 1.0e8, vec![10.0, 12.0])
        .with_company("BBB", "Canada", 1.0e9, 1.0e8, vec![10.0, 12.0])
        .with_company("TSE", "Japan", 5.0e9, 5.0e8, vec![10.0, 11.0])
}

fn request(refresh: bool) -> PortfolioRequest {
    PortfolioRequest {
        filters: filters(&["Growth", "Value"]),
        allocation: north_america(),
        tickers: None,
        policy: RefreshPolicy {
            now: SystemTime::now(),
            force_refresh: refresh,
        },
    }
}

mod portfolio_pipeline {
    use super::*;

    #[test]
    fn screens_fetches_and_allocates() {
        let market = market();
        let cache = MemoryCache::default();
        let portfolio = cli::portfolio_pipeline(&market, &cache, &request(false)).unwrap();

        // CCC has no fundamentals, TSE is outside the allow-list
        assert_eq!(portfolio.holdings.len(), 2);
        assert_eq!(portfolio.unavailable, 1);
        assert_eq!(portfolio.filtered_out, 1);
        assert_relative_eq!(portfolio.total_weight(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(portfolio.holdings[0].allocation_weight_percent, 50.0, epsilon = 1e-9);
        assert_eq!(portfolio.holdings[0].ticker, "AAA");
        assert_eq!(portfolio.holdings[1].ticker, "BBB");
        assert_eq!(*cache.writes.borrow(), 1);
    }

    #[test]
    fn failing_screen_is_skipped() {
        let market = market().with_screen_error("Growth", "HTTP 503");
        let cache = MemoryCache::default();
        let portfolio = cli::portfolio_pipeline(&market, &cache, &request(false)).unwrap();

        let tickers: Vec<&str> = portfolio.holdings.iter().map(|h| h.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BBB"]);
        assert_relative_eq!(portfolio.total_weight(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn second_run_is_served_from_cache() {
        let market = market();
        let cache = MemoryCache::default();
        let first = cli::portfolio_pipeline(&market, &cache, &request(false)).unwrap();
        let calls = *market.fundamentals_calls.borrow();

        let second = cli::portfolio_pipeline(&market, &cache, &request(false)).unwrap();
        assert_eq!(second.source, PortfolioSource::Cache);
        assert_eq!(second.holdings, first.holdings);
        assert_eq!(*market.fundamentals_calls.borrow(), calls);
    }

    #[test]
    fn refresh_bypasses_cache() {
        let market = market();
        let cache = MemoryCache::default();
        cli::portfolio_pipeline(&market, &cache, &request(false)).unwrap();
        let refreshed = cli::portfolio_pipeline(&market, &cache, &request(true)).unwrap();

        assert_eq!(refreshed.source, PortfolioSource::Computed);
        assert_eq!(*cache.writes.borrow(), 2);
    }

    #[test]
    fn explicit_tickers_skip_screening_and_cache() {
        let market = market();
        let cache = MemoryCache::default();
        let req = PortfolioRequest {
            tickers: Some(vec!["AAA".to_string(), "TSE".to_string()]),
            allocation: AllocationConfig::default(),
            ..request(false)
        };
        let portfolio = cli::portfolio_pipeline(&market, &cache, &req).unwrap();

        assert_eq!(portfolio.holdings.len(), 2);
        assert_eq!(*cache.writes.borrow(), 0);
        // TSE has five times the revenue and market cap, so it leads
        assert_eq!(portfolio.holdings[0].ticker, "TSE");
    }

    #[test]
    fn nothing_screened_gives_empty_portfolio_and_no_cache_write() {
        let market = MockMarketData::new();
        let cache = MemoryCache::default();
        let portfolio = cli::portfolio_pipeline(&market, &cache, &request(false)).unwrap();
        assert!(portfolio.is_empty());
        assert_eq!(*cache.writes.borrow(), 0);
    }
}

mod file_cache {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn csv_cache_serves_until_stale() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCacheAdapter::new(dir.path().join("portfolio_data.csv"))
            .with_max_age(Duration::from_secs(24 * 3600));
        let market = market();
        let filters = filters(&["Growth", "Value"]);
        let config = north_america();
        let now = SystemTime::now();

        let computed =
            get_portfolio(&cache, &market, &market, &filters, &config, RefreshPolicy::at(now))
                .unwrap();
        assert_eq!(computed.source, PortfolioSource::Computed);

        let cached =
            get_portfolio(&cache, &market, &market, &filters, &config, RefreshPolicy::at(now))
                .unwrap();
        assert_eq!(cached.source, PortfolioSource::Cache);
        assert_eq!(cached.holdings, computed.holdings);

        let tomorrow = now + Duration::from_secs(25 * 3600);
        let stale = get_portfolio(
            &cache,
            &market,
            &market,
            &filters,
            &config,
            RefreshPolicy::at(tomorrow),
        )
        .unwrap();
        assert_eq!(stale.source, PortfolioSource::Computed);
    }
}

mod backtest_pipeline {
    use super::*;
    use std::cell::RefCell;
    use std::path::Path;

    fn as_of() -> chrono::NaiveDate {
        date(2024, 6, 28)
    }

    fn priced_market() -> MockMarketData {
        market()
            .with_prices("AAA", closes_ending(as_of(), &[100.0, 120.0, 150.0]))
            .with_prices("BBB", closes_ending(as_of(), &[100.0, 80.0, 50.0]))
    }

    #[derive(Default)]
    struct RecordingReporter {
        audits: RefCell<Vec<String>>,
        summaries: RefCell<Vec<String>>,
    }

    impl ReportPort for RecordingReporter {
        fn write_audit(
            &self,
            report: &alphaflex::domain::backtest::BacktestReport,
            path: &Path,
        ) -> Result<(), AlphaflexError> {
            self.audits
                .borrow_mut()
                .push(format!("{}:{}", path.display(), report.positions.len()));
            Ok(())
        }

        fn write_summary(
            &self,
            _: &alphaflex::domain::backtest::BacktestReport,
            path: &Path,
        ) -> Result<(), AlphaflexError> {
            self.summaries.borrow_mut().push(path.display().to_string());
            Ok(())
        }
    }

    #[test]
    fn allocation_flows_into_backtest() {
        let market = priced_market();
        let cache = MemoryCache::default();
        let params = BacktestParams::new(10_000.0, Period::OneMonth, as_of());
        let reporter = RecordingReporter::default();
        let outputs = OutputPaths {
            audit: Some("audit.csv".into()),
            summary: Some("summary.csv".into()),
        };

        let report = cli::run_backtest_pipeline(
            &market,
            &cache,
            &request(false),
            &params,
            &outputs,
            &reporter,
        )
        .unwrap();

        // 5000 * 1.5 + 5000 * 0.5
        assert_relative_eq!(report.ending_value, 10_000.0, epsilon = 1e-6);
        assert_relative_eq!(report.percentage_return, 0.0, epsilon = 1e-9);
        assert_eq!(report.positions.len(), 2);
        assert_eq!(reporter.audits.borrow().as_slice(), ["audit.csv:2"]);
        assert_eq!(reporter.summaries.borrow().as_slice(), ["summary.csv"]);
    }

    #[test]
    fn price_failure_redistributes_weight() {
        let market = priced_market().with_price_error("BBB", "timeout");
        let allocation = vec![
            alphaflex::domain::allocation::AllocationEntry {
                ticker: "AAA".into(),
                weight_percent: 25.0,
            },
            alphaflex::domain::allocation::AllocationEntry {
                ticker: "BBB".into(),
                weight_percent: 75.0,
            },
        ];
        let params = BacktestParams::new(1_000.0, Period::OneMonth, as_of());
        let report = run_backtest_with_port(&allocation, &params, &market).unwrap();

        assert_eq!(report.positions.len(), 1);
        assert_relative_eq!(report.positions[0].weight, 1.0, epsilon = 1e-12);
        assert_relative_eq!(report.ending_value, 1_500.0, epsilon = 1e-9);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].ticker, "BBB");
    }

    #[test]
    fn zero_survivors_strict_mode_fails() {
        let market = market();
        let cache = MemoryCache::default();
        let mut params = BacktestParams::new(10_000.0, Period::OneYear, as_of());
        params.strict = true;

        let err = cli::run_backtest_pipeline(
            &market,
            &cache,
            &request(false),
            &params,
            &OutputPaths::default(),
            &RecordingReporter::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AlphaflexError::NoUsableData { requested: 2 }));
    }

    #[test]
    fn zero_survivors_lenient_mode_flags_report() {
        let market = market();
        let cache = MemoryCache::default();
        let params = BacktestParams::new(10_000.0, Period::OneYear, as_of());

        let report = cli::run_backtest_pipeline(
            &market,
            &cache,
            &request(false),
            &params,
            &OutputPaths::default(),
            &RecordingReporter::default(),
        )
        .unwrap();
        assert!(report.zero_survivor);
        assert_eq!(report.ending_value, 0.0);
        assert_eq!(report.percentage_return, -100.0);
    }
}
