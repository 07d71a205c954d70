//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_cache_adapter;
pub mod csv_report_adapter;
#[cfg(feature = "fmp")]
pub mod fmp_adapter;
pub mod file_config_adapter;
pub mod provider;
