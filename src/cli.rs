//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

use crate::adapters::csv_cache_adapter::{CsvCacheAdapter, DEFAULT_MAX_AGE};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::provider::{MarketDataProvider, ProviderKind, ProviderSettings};
use crate::domain::allocation::{AllocationConfig, BlendWeights};
use crate::domain::backtest::{
    BacktestParams, BacktestReport, DEFAULT_RISK_FREE_RATE_PCT, run_backtest_with_port,
};
use crate::domain::config_validation::validate_config;
use crate::domain::error::AlphaflexError;
use crate::domain::filters::FilterSet;
use crate::domain::period::Period;
use crate::domain::portfolio::{
    Portfolio, PortfolioSource, RefreshPolicy, build_from_tickers, get_portfolio,
};
use crate::domain::universe::parse_tickers;
use crate::ports::cache_port::AllocationCachePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{FundamentalsPort, PriceHistoryPort, TickerUniversePort};
use crate::ports::report_port::ReportPort;

pub const API_KEY_ENV: &str = "ALPHAFLEX_API_KEY";
const API_KEY_PLACEHOLDER: &str = "your_api_key_here";

pub const DEFAULT_COUNTRIES: [&str; 2] = ["United States", "Canada"];
pub const DEFAULT_CACHE_PATH: &str = "portfolio_data.csv";
pub const DEFAULT_INVESTMENT: f64 = 10_000.0;
pub const DEFAULT_PERIOD: Period = Period::OneYear;

#[derive(Parser, Debug)]
#[command(
    name = "alphaflex",
    about = "Multi-factor equity allocation and buy-and-hold backtesting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the allocation, recomputing it when the cache is stale
    Portfolio {
        #[arg(short, long)]
        config: PathBuf,
        /// Ignore the cache and recompute
        #[arg(long)]
        refresh: bool,
        /// Comma-separated tickers to allocate over instead of screening
        #[arg(long)]
        tickers: Option<String>,
    },
    /// Backtest the allocation over a lookback period
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        investment: Option<f64>,
        /// One of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 3y, 5y, ytd
        #[arg(long)]
        period: Option<String>,
        /// Annual risk-free rate in percent
        #[arg(long)]
        risk_free_rate: Option<f64>,
        /// Evaluate as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        as_of: Option<NaiveDate>,
        /// Audit CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Fail when no ticker has usable prices
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        refresh: bool,
        #[arg(long)]
        tickers: Option<String>,
    },
    /// List the built-in screener filters
    Filters,
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Portfolio {
            config,
            refresh,
            tickers,
        } => run_portfolio(&config, refresh, tickers.as_deref()),
        Command::Backtest {
            config,
            investment,
            period,
            risk_free_rate,
            as_of,
            output,
            strict,
            refresh,
            tickers,
        } => {
            let overrides = BacktestOverrides {
                investment,
                period,
                risk_free_rate,
                as_of,
                output,
                strict,
            };
            run_backtest_command(&config, &overrides, refresh, tickers.as_deref())
        }
        Command::Filters => {
            print!("{}", format_filters(&FilterSet::builtin()));
            Ok(())
        }
        Command::Validate { config } => run_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, AlphaflexError> {
    info!("loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

fn load_validated(path: &Path) -> Result<FileConfigAdapter, AlphaflexError> {
    let config = load_config(path)?;
    validate_config(&config)?;
    Ok(config)
}

fn not_placeholder(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == API_KEY_PLACEHOLDER {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Environment value first, then the config file. Blank values and the
/// sample placeholder count as unset.
pub fn resolve_api_key(env_value: Option<String>, config: &dyn ConfigPort) -> Option<String> {
    env_value
        .and_then(not_placeholder)
        .or_else(|| config.get_string("provider", "api_key").and_then(not_placeholder))
}

pub fn build_provider_settings(
    config: &dyn ConfigPort,
    env_api_key: Option<String>,
) -> Result<ProviderSettings, AlphaflexError> {
    let kind: ProviderKind = config
        .get_string("provider", "kind")
        .unwrap_or_else(|| "csv".to_string())
        .parse()?;

    Ok(ProviderSettings {
        kind,
        data_dir: config.get_string("provider", "data_dir").map(PathBuf::from),
        base_url: config
            .get_string("provider", "base_url")
            .unwrap_or_else(|| default_base_url().to_string()),
        api_key: resolve_api_key(env_api_key, config),
        batch_size: config.get_int("provider", "batch_size", 10).max(1) as usize,
        max_retries: config.get_int("provider", "max_retries", 3).max(1) as usize,
        retry_delay: Duration::from_secs(config.get_int("provider", "retry_delay_secs", 5).max(0) as u64),
    })
}

#[cfg(feature = "fmp")]
fn default_base_url() -> &'static str {
    crate::adapters::fmp_adapter::DEFAULT_BASE_URL
}

#[cfg(not(feature = "fmp"))]
fn default_base_url() -> &'static str {
    "https://financialmodelingprep.com/api/v3"
}

/// `countries = *` admits every country; an absent key keeps the default
/// North American allow-list.
pub fn build_allocation_config(config: &dyn ConfigPort) -> AllocationConfig {
    let defaults = BlendWeights::default();
    let blend = BlendWeights {
        log_market_cap: config.get_double("allocation", "log_market_cap", defaults.log_market_cap),
        equal: config.get_double("allocation", "equal", defaults.equal),
        volatility: config.get_double("allocation", "volatility", defaults.volatility),
        fundamental: config.get_double("allocation", "fundamental", defaults.fundamental),
    };

    let countries = config
        .get_list("universe", "countries")
        .unwrap_or_else(|| DEFAULT_COUNTRIES.iter().map(|c| c.to_string()).collect());
    let countries = if countries.iter().any(|c| c == "*") {
        Vec::new()
    } else {
        countries
    };

    AllocationConfig {
        blend,
        ..AllocationConfig::default()
    }
    .with_countries(countries)
}

pub fn build_filters(config: &dyn ConfigPort) -> Result<FilterSet, AlphaflexError> {
    let builtin = FilterSet::builtin();
    match config.get_list("universe", "filters") {
        Some(names) => builtin.select(&names),
        None => Ok(builtin),
    }
}

pub fn build_cache(config: &dyn ConfigPort) -> CsvCacheAdapter {
    let path = config
        .get_string("cache", "path")
        .unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string());
    let hours = config.get_double("cache", "max_age_hours", 24.0);
    let max_age = Duration::try_from_secs_f64(hours * 3600.0).unwrap_or(DEFAULT_MAX_AGE);
    CsvCacheAdapter::new(PathBuf::from(path)).with_max_age(max_age)
}

/// Command-line values that take precedence over the `[backtest]` section.
#[derive(Debug, Clone, Default)]
pub struct BacktestOverrides {
    pub investment: Option<f64>,
    pub period: Option<String>,
    pub risk_free_rate: Option<f64>,
    pub as_of: Option<NaiveDate>,
    pub output: Option<PathBuf>,
    pub strict: bool,
}

pub fn build_backtest_params(
    config: &dyn ConfigPort,
    overrides: &BacktestOverrides,
    today: NaiveDate,
) -> Result<BacktestParams, AlphaflexError> {
    let investment = overrides
        .investment
        .unwrap_or_else(|| config.get_double("backtest", "investment", DEFAULT_INVESTMENT));
    if !(investment.is_finite() && investment > 0.0) {
        return Err(AlphaflexError::InvalidInvestment(investment));
    }

    let period = match overrides
        .period
        .clone()
        .or_else(|| config.get_string("backtest", "period"))
    {
        Some(raw) => raw.parse::<Period>()?,
        None => DEFAULT_PERIOD,
    };

    Ok(BacktestParams {
        initial_investment: investment,
        period,
        risk_free_rate_pct: overrides.risk_free_rate.unwrap_or_else(|| {
            config.get_double("backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE_PCT)
        }),
        as_of: overrides.as_of.unwrap_or(today),
        strict: overrides.strict || config.get_bool("backtest", "strict", false),
    })
}

/// Where a backtest writes its CSV output, if anywhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputPaths {
    pub audit: Option<PathBuf>,
    pub summary: Option<PathBuf>,
}

pub fn build_output_paths(config: &dyn ConfigPort, overrides: &BacktestOverrides) -> OutputPaths {
    OutputPaths {
        audit: overrides
            .output
            .clone()
            .or_else(|| config.get_string("backtest", "audit_path").map(PathBuf::from)),
        summary: config.get_string("backtest", "summary_path").map(PathBuf::from),
    }
}

/// Which tickers to allocate over and whether to bypass the cache.
#[derive(Debug, Clone)]
pub struct PortfolioRequest {
    pub filters: FilterSet,
    pub allocation: AllocationConfig,
    /// Explicit tickers skip screening and the cache entirely.
    pub tickers: Option<Vec<String>>,
    pub policy: RefreshPolicy,
}

pub fn parse_ticker_arg(raw: &str) -> Result<Vec<String>, AlphaflexError> {
    parse_tickers(raw).map_err(|e| AlphaflexError::ConfigInvalid {
        section: "cli".into(),
        key: "tickers".into(),
        reason: e.to_string(),
    })
}

fn build_request(
    config: &dyn ConfigPort,
    refresh: bool,
    tickers: Option<&str>,
) -> Result<PortfolioRequest, AlphaflexError> {
    Ok(PortfolioRequest {
        filters: build_filters(config)?,
        allocation: build_allocation_config(config),
        tickers: tickers.map(parse_ticker_arg).transpose()?,
        policy: RefreshPolicy {
            now: SystemTime::now(),
            force_refresh: refresh,
        },
    })
}

fn open_provider(config: &dyn ConfigPort) -> Result<MarketDataProvider, AlphaflexError> {
    let settings = build_provider_settings(config, std::env::var(API_KEY_ENV).ok())?;
    info!("using {:?} provider", settings.kind);
    MarketDataProvider::open(&settings)
}

pub fn portfolio_pipeline<P>(
    provider: &P,
    cache: &dyn AllocationCachePort,
    request: &PortfolioRequest,
) -> Result<Portfolio, AlphaflexError>
where
    P: TickerUniversePort + FundamentalsPort,
{
    match &request.tickers {
        Some(tickers) => Ok(build_from_tickers(provider, tickers, &request.allocation)),
        None => get_portfolio(
            cache,
            provider,
            provider,
            &request.filters,
            &request.allocation,
            request.policy,
        ),
    }
}

pub fn run_backtest_pipeline<P>(
    provider: &P,
    cache: &dyn AllocationCachePort,
    request: &PortfolioRequest,
    params: &BacktestParams,
    outputs: &OutputPaths,
    reporter: &dyn ReportPort,
) -> Result<BacktestReport, AlphaflexError>
where
    P: TickerUniversePort + FundamentalsPort + PriceHistoryPort,
{
    let portfolio = portfolio_pipeline(provider, cache, request)?;
    if portfolio.is_empty() {
        warn!("allocation is empty, nothing to backtest");
    }

    let report = run_backtest_with_port(&portfolio.entries(), params, provider)?;

    if let Some(path) = &outputs.audit {
        reporter.write_audit(&report, path)?;
        info!("audit written to {}", path.display());
    }
    if let Some(path) = &outputs.summary {
        reporter.write_summary(&report, path)?;
        info!("summary written to {}", path.display());
    }
    Ok(report)
}

fn run_portfolio(
    config_path: &Path,
    refresh: bool,
    tickers: Option<&str>,
) -> Result<(), AlphaflexError> {
    let config = load_validated(config_path)?;
    let request = build_request(&config, refresh, tickers)?;
    let provider = open_provider(&config)?;
    let cache = build_cache(&config);

    let portfolio = portfolio_pipeline(&provider, &cache, &request)?;
    print!("{}", format_portfolio(&portfolio));
    Ok(())
}

fn run_backtest_command(
    config_path: &Path,
    overrides: &BacktestOverrides,
    refresh: bool,
    tickers: Option<&str>,
) -> Result<(), AlphaflexError> {
    let config = load_validated(config_path)?;
    let params = build_backtest_params(&config, overrides, Local::now().date_naive())?;
    let outputs = build_output_paths(&config, overrides);
    let request = build_request(&config, refresh, tickers)?;
    let provider = open_provider(&config)?;
    let cache = build_cache(&config);

    let report = run_backtest_pipeline(
        &provider,
        &cache,
        &request,
        &params,
        &outputs,
        &CsvReportAdapter,
    )?;
    print!("{}", format_report(&report));
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), AlphaflexError> {
    let config = load_validated(config_path)?;
    let settings = build_provider_settings(&config, std::env::var(API_KEY_ENV).ok())?;
    if settings.kind == ProviderKind::Fmp && settings.api_key.is_none() {
        return Err(AlphaflexError::ConfigMissing {
            section: "provider".into(),
            key: "api_key".into(),
        });
    }
    let filters = build_filters(&config)?;
    let params = build_backtest_params(
        &config,
        &BacktestOverrides::default(),
        Local::now().date_naive(),
    )?;

    println!("Configuration is valid");
    println!("  provider: {:?}", settings.kind);
    println!("  filters:  {}", filters.names().join(", "));
    println!(
        "  backtest: {:.2} over {} (risk-free {}%)",
        params.initial_investment, params.period, params.risk_free_rate_pct
    );
    Ok(())
}

pub fn format_filters(filters: &FilterSet) -> String {
    let mut out = String::new();
    for (name, criteria) in filters.iter() {
        let _ = writeln!(out, "{name}");
        for (criterion, threshold) in criteria {
            let _ = writeln!(out, "  {criterion}: {threshold}");
        }
    }
    out
}

pub fn format_portfolio(portfolio: &Portfolio) -> String {
    let mut out = String::new();
    if portfolio.is_empty() {
        out.push_str("No holdings\n");
        return out;
    }

    let source = match portfolio.source {
        PortfolioSource::Cache => "cache",
        PortfolioSource::Computed => "computed",
    };
    let _ = writeln!(
        out,
        "{} holdings ({source}, total {:.2}%)",
        portfolio.holdings.len(),
        portfolio.total_weight()
    );
    let _ = writeln!(
        out,
        "{:<8} {:>9}  {:<16} {:<24} {}",
        "TICKER", "WEIGHT%", "COUNTRY", "SECTOR", "NAME"
    );
    for h in &portfolio.holdings {
        let _ = writeln!(
            out,
            "{:<8} {:>9.4}  {:<16} {:<24} {}",
            h.ticker,
            h.allocation_weight_percent,
            h.country.as_deref().unwrap_or("-"),
            h.sector.as_deref().unwrap_or("-"),
            h.name.as_deref().unwrap_or("-")
        );
    }
    if portfolio.unavailable + portfolio.excluded + portfolio.filtered_out > 0 {
        let _ = writeln!(
            out,
            "skipped: {} unavailable, {} excluded, {} outside allowed countries",
            portfolio.unavailable, portfolio.excluded, portfolio.filtered_out
        );
    }
    out
}

pub fn format_report(report: &BacktestReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Backtest {} ({} to {}, {} trading days)",
        report.period, report.window.start, report.window.end, report.window.trading_days
    );
    let _ = writeln!(out, "  initial investment: {:.2}", report.initial_investment);
    let _ = writeln!(out, "  ending value:       {:.2}", report.ending_value);
    let _ = writeln!(out, "  return:             {:+.2}%", report.percentage_return);
    match report.annualized_volatility {
        Some(vol) => {
            let _ = writeln!(out, "  volatility:         {vol:.4}");
        }
        None => out.push_str("  volatility:         n/a\n"),
    }
    match report.sharpe_ratio {
        Some(sharpe) => {
            let _ = writeln!(out, "  sharpe ratio:       {sharpe:.4}");
        }
        None => out.push_str("  sharpe ratio:       n/a\n"),
    }
    if report.zero_survivor {
        out.push_str("  warning: no ticker had usable prices\n");
    }
    for d in &report.dropped {
        let _ = writeln!(out, "  dropped {}: {}", d.ticker, d.reason);
    }
    out
}
