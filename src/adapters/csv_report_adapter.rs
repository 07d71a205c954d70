//! CSV backtest output: a per-position audit table and a one-row summary.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::AlphaflexError;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub struct CsvReportAdapter;

#[derive(Debug, Serialize)]
struct AuditRow<'a> {
    ticker: &'a str,
    initial_value: f64,
    final_value: f64,
    percentage_change: f64,
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    period: &'static str,
    start_date: String,
    end_date: String,
    trading_days: usize,
    initial_investment: f64,
    ending_value: f64,
    percentage_return: f64,
    volatility: Option<f64>,
    sharpe_ratio: Option<f64>,
    zero_survivor: bool,
    positions: usize,
    dropped: usize,
}

fn report_error(path: &Path, e: impl std::fmt::Display) -> AlphaflexError {
    AlphaflexError::Io(std::io::Error::other(format!(
        "failed to write {}: {}",
        path.display(),
        e
    )))
}

fn writer(path: &Path) -> Result<csv::Writer<fs::File>, AlphaflexError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    csv::Writer::from_path(path).map_err(|e| report_error(path, e))
}

impl ReportPort for CsvReportAdapter {
    fn write_audit(&self, report: &BacktestReport, path: &Path) -> Result<(), AlphaflexError> {
        let mut wtr = writer(path)?;
        if report.positions.is_empty() {
            wtr.write_record(["ticker", "initial_value", "final_value", "percentage_change"])
                .map_err(|e| report_error(path, e))?;
        }
        for position in &report.positions {
            wtr.serialize(AuditRow {
                ticker: &position.ticker,
                initial_value: position.initial_value,
                final_value: position.final_value,
                percentage_change: position.percentage_change,
            })
            .map_err(|e| report_error(path, e))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_summary(&self, report: &BacktestReport, path: &Path) -> Result<(), AlphaflexError> {
        let mut wtr = writer(path)?;
        wtr.serialize(SummaryRow {
            period: report.period.as_str(),
            start_date: report.window.start.to_string(),
            end_date: report.window.end.to_string(),
            trading_days: report.window.trading_days,
            initial_investment: report.initial_investment,
            ending_value: report.ending_value,
            percentage_return: report.percentage_return,
            volatility: report.annualized_volatility,
            sharpe_ratio: report.sharpe_ratio,
            zero_survivor: report.zero_survivor,
            positions: report.positions.len(),
            dropped: report.dropped.len(),
        })
        .map_err(|e| report_error(path, e))?;
        wtr.flush()?;
        Ok(())
    }
}
