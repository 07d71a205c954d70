//! Configuration validation.
//!
//! Checks every section before a run so a bad value fails fast with the
//! offending section and key.

use crate::domain::allocation::BlendWeights;
use crate::domain::error::AlphaflexError;
use crate::domain::filters::FilterSet;
use crate::domain::period::Period;
use crate::ports::config_port::ConfigPort;

pub const PROVIDER_KINDS: [&str; 2] = ["csv", "fmp"];

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), AlphaflexError> {
    validate_provider(config)?;
    validate_universe(config)?;
    validate_allocation(config)?;
    validate_cache(config)?;
    validate_backtest(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> AlphaflexError {
    AlphaflexError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_provider(config: &dyn ConfigPort) -> Result<(), AlphaflexError> {
    let kind = config
        .get_string("provider", "kind")
        .unwrap_or_else(|| "csv".to_string());
    let kind = kind.trim().to_lowercase();
    if !PROVIDER_KINDS.contains(&kind.as_str()) {
        return Err(invalid("provider", "kind", "kind must be csv or fmp"));
    }

    if kind == "csv" {
        match config.get_string("provider", "data_dir") {
            Some(dir) if !dir.trim().is_empty() => {}
            _ => {
                return Err(AlphaflexError::ConfigMissing {
                    section: "provider".to_string(),
                    key: "data_dir".to_string(),
                });
            }
        }
    }

    if config.get_int("provider", "batch_size", 10) < 1 {
        return Err(invalid("provider", "batch_size", "batch_size must be at least 1"));
    }
    if config.get_int("provider", "max_retries", 3) < 1 {
        return Err(invalid("provider", "max_retries", "max_retries must be at least 1"));
    }
    if config.get_int("provider", "retry_delay_secs", 5) < 0 {
        return Err(invalid(
            "provider",
            "retry_delay_secs",
            "retry_delay_secs must be non-negative",
        ));
    }
    Ok(())
}

fn validate_universe(config: &dyn ConfigPort) -> Result<(), AlphaflexError> {
    if let Some(names) = config.get_list("universe", "filters") {
        if names.is_empty() {
            return Err(invalid("universe", "filters", "at least one filter is required"));
        }
        FilterSet::builtin().select(&names)?;
    }
    Ok(())
}

fn validate_allocation(config: &dyn ConfigPort) -> Result<(), AlphaflexError> {
    let defaults = BlendWeights::default();
    let mut sum = 0.0;
    for (key, default) in [
        ("log_market_cap", defaults.log_market_cap),
        ("equal", defaults.equal),
        ("volatility", defaults.volatility),
        ("fundamental", defaults.fundamental),
    ] {
        let value = config.get_double("allocation", key, default);
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(
                "allocation",
                key,
                "coefficient must be a non-negative number",
            ));
        }
        sum += value;
    }
    if sum <= 0.0 {
        return Err(invalid(
            "allocation",
            "fundamental",
            "coefficients must not all be zero",
        ));
    }
    Ok(())
}

fn validate_cache(config: &dyn ConfigPort) -> Result<(), AlphaflexError> {
    let hours = config.get_double("cache", "max_age_hours", 24.0);
    if !hours.is_finite() || hours <= 0.0 {
        return Err(invalid("cache", "max_age_hours", "max_age_hours must be positive"));
    }
    Ok(())
}

fn validate_backtest(config: &dyn ConfigPort) -> Result<(), AlphaflexError> {
    let investment = config.get_double("backtest", "investment", 10_000.0);
    if !investment.is_finite() || investment <= 0.0 {
        return Err(invalid("backtest", "investment", "investment must be positive"));
    }

    if let Some(period) = config.get_string("backtest", "period") {
        period.parse::<Period>()?;
    }

    // negative rates are legitimate
    let rate = config.get_double("backtest", "risk_free_rate", 4.52);
    if !rate.is_finite() {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be a finite percentage",
        ));
    }
    Ok(())
}
