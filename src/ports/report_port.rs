//! Backtest report output port.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::AlphaflexError;
use std::path::Path;

/// Port for writing backtest output files.
pub trait ReportPort {
    /// Per-position audit table.
    fn write_audit(&self, report: &BacktestReport, path: &Path) -> Result<(), AlphaflexError>;

    /// One-row run summary.
    fn write_summary(&self, report: &BacktestReport, path: &Path) -> Result<(), AlphaflexError>;
}
