//! Core domain types and logic.

pub mod allocation;
pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod filters;
pub mod fundamentals;
pub mod metrics;
pub mod period;
pub mod portfolio;
pub mod price_series;
pub mod universe;
