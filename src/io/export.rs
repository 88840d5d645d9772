//! Export results and generated data to CSV.
//!
//! Exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::analysis::BacktestResult;
use crate::data::SampleRow;
use crate::domain::MonthKey;
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct BacktestCsvRow {
    month: MonthKey,
    checkpoint: i64,
    days_before: i64,
    prediction: String,
    actual: String,
    error_pct: String,
}

/// Write per-checkpoint backtest predictions to a CSV file.
pub fn write_backtest_csv(path: &Path, results: &[BacktestResult]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::usage(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_backtest_rows(file, results)
}

pub fn write_backtest_rows<W: Write>(writer: W, results: &[BacktestResult]) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    for r in results {
        w.serialize(BacktestCsvRow {
            month: r.month,
            checkpoint: r.checkpoint,
            days_before: r.days_before,
            prediction: format!("{:.2}", r.prediction),
            actual: format!("{:.2}", r.actual),
            error_pct: r.error_pct().map(|e| format!("{e:.4}")).unwrap_or_default(),
        })
        .map_err(|e| AppError::internal(format!("Failed to write export CSV row: {e}")))?;
    }
    w.flush()
        .map_err(|e| AppError::internal(format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write generated snapshot rows in the ingest format.
pub fn write_snapshot_csv(path: &Path, rows: &[SampleRow]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::usage(format!("Failed to create sample CSV '{}': {e}", path.display())))?;
    write_snapshot_rows(file, rows)
}

pub fn write_snapshot_rows<W: Write>(writer: W, rows: &[SampleRow]) -> Result<(), AppError> {
    let mut w = csv::Writer::from_writer(writer);
    for row in rows {
        w.serialize(row)
            .map_err(|e| AppError::internal(format!("Failed to write sample CSV row: {e}")))?;
    }
    w.flush()
        .map_err(|e| AppError::internal(format!("Failed to flush sample CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_csv_has_header_and_blank_error_for_zero_actual() {
        let m = MonthKey::new(2025, 5).unwrap();
        let results = vec![
            BacktestResult { month: m, checkpoint: 30, days_before: 29, prediction: 110.0, actual: 100.0 },
            BacktestResult { month: m, checkpoint: 7, days_before: 7, prediction: 5.0, actual: 0.0 },
        ];
        let mut buf = Vec::new();
        write_backtest_rows(&mut buf, &results).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "month,checkpoint,days_before,prediction,actual,error_pct");
        assert_eq!(lines[1], "2025-05,30,29,110.00,100.00,10.0000");
        assert_eq!(lines[2], "2025-05,7,7,5.00,0.00,");
    }
}
