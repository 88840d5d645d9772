//! Walk-forward backtest of the growth model.
//!
//! Each historical month from the cutoff onward is predicted by a model trained
//! on exactly the three historical months before it. Nothing at or after the
//! test month reaches the training set.

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::{ClosingValue, DailySnapshot, MonthKey, MonthSeries};
use crate::models::{project_to_close, train_growth_curve};
use crate::series::{nearest_point, MonthClasses};

pub const BACKTEST_CHECKPOINTS: [i64; 6] = [60, 45, 30, 15, 7, 1];
pub const BACKTEST_TOLERANCE_DAYS: i64 = 3;
/// Number of immediately preceding historical months used for training.
pub const TRAINING_MONTHS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub month: MonthKey,
    pub checkpoint: i64,
    /// Days-before-close of the matched point (not the checkpoint itself).
    pub days_before: i64,
    pub prediction: f64,
    pub actual: f64,
}

impl BacktestResult {
    /// Signed error in percent of the actual (`None` when actual is zero).
    pub fn error_pct(&self) -> Option<f64> {
        (self.actual != 0.0).then(|| (self.prediction - self.actual) / self.actual * 100.0)
    }
}

/// Accuracy for one checkpoint across all backtested months.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointAccuracy {
    pub checkpoint: i64,
    pub count: usize,
    /// Mean absolute percentage error.
    pub mape: f64,
    /// Mean signed percentage error (positive = over-forecast).
    pub bias_pct: f64,
}

/// Predict `month` at every checkpoint with a curve trained on `training`.
pub fn backtest_month(
    month: MonthKey,
    trajectory: &[DailySnapshot],
    close: &ClosingValue,
    training: &[MonthKey],
    series: &MonthSeries,
) -> Vec<BacktestResult> {
    let curve = train_growth_curve(series, training);
    BACKTEST_CHECKPOINTS
        .iter()
        .filter_map(|&checkpoint| {
            let point = nearest_point(trajectory, checkpoint, BACKTEST_TOLERANCE_DAYS)?;
            Some(BacktestResult {
                month,
                checkpoint,
                days_before: point.days_before_close,
                prediction: project_to_close(point.weighted_pipeline, point.days_before_close, &curve),
                actual: close.weighted,
            })
        })
        .collect()
}

/// Walk forward over the historical months from `cutoff` onward.
pub fn run_backtest(series: &MonthSeries, classes: &MonthClasses, cutoff: MonthKey) -> Vec<BacktestResult> {
    let history = &classes.historical;
    let Some(start) = history.iter().position(|m| *m >= cutoff) else {
        info!("backtest: no historical months on or after {cutoff}");
        return Vec::new();
    };

    let per_month: Vec<Vec<BacktestResult>> = (start.max(TRAINING_MONTHS)..history.len())
        .into_par_iter()
        .map(|i| {
            let month = history[i];
            let (Some(trajectory), Some(close)) = (series.get(&month), classes.closing_value(month)) else {
                debug!("backtest: {month} has no actual close, skipped");
                return Vec::new();
            };
            let training = &history[i - TRAINING_MONTHS..i];
            backtest_month(month, trajectory, close, training, series)
        })
        .collect();

    let results: Vec<BacktestResult> = per_month.into_iter().flatten().collect();
    info!("backtest: {} predictions", results.len());
    results
}

/// Per-checkpoint accuracy, in checkpoint order. Checkpoints with no results are omitted.
pub fn summarize_backtest(results: &[BacktestResult]) -> Vec<CheckpointAccuracy> {
    BACKTEST_CHECKPOINTS
        .iter()
        .filter_map(|&checkpoint| {
            let errors: Vec<f64> = results
                .iter()
                .filter(|r| r.checkpoint == checkpoint)
                .filter_map(BacktestResult::error_pct)
                .collect();
            if errors.is_empty() {
                return None;
            }
            let n = errors.len() as f64;
            Some(CheckpointAccuracy {
                checkpoint,
                count: errors.len(),
                mape: errors.iter().map(|e| e.abs()).sum::<f64>() / n,
                bias_pct: errors.iter().sum::<f64>() / n,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::series::classify_months;

    /// A month growing by `rate` per day from 89 days out to close.
    fn month_traj(month: MonthKey, rate: f64) -> Vec<DailySnapshot> {
        (0..=89)
            .rev()
            .map(|d| DailySnapshot {
                snapshot_date: month.end_instant() - Duration::days(d),
                days_before_close: d,
                raw_pipeline: 0.0,
                weighted_pipeline: 100.0 * (1.0 + rate).powi(89 - d as i32),
            })
            .collect()
    }

    fn build(rates: &[(u32, f64)]) -> (MonthSeries, MonthClasses) {
        let mut series = MonthSeries::new();
        for (m, r) in rates {
            let key = MonthKey::new(2025, *m).unwrap();
            series.insert(key, month_traj(key, *r));
        }
        let as_of = MonthKey::new(2026, 1).unwrap().start_instant();
        let classes = classify_months(&series, as_of);
        (series, classes)
    }

    #[test]
    fn needs_three_prior_months() {
        let (series, classes) = build(&[(2, 0.01), (3, 0.01), (4, 0.01), (5, 0.01)]);
        let cutoff = MonthKey::new(2025, 4).unwrap();
        let results = run_backtest(&series, &classes, cutoff);
        // April has only two predecessors, so only May is tested.
        assert!(results.iter().all(|r| r.month == MonthKey::new(2025, 5).unwrap()));
        assert_eq!(results.len(), BACKTEST_CHECKPOINTS.len());
        for r in &results {
            assert_eq!(r.days_before, r.checkpoint);
            assert!((r.prediction - r.actual).abs() / r.actual < 1e-9);
        }
    }

    #[test]
    fn future_months_do_not_leak_into_training() {
        let rates = [(1, 0.01), (2, 0.01), (3, 0.01), (4, 0.02), (5, 0.03)];
        let (series, classes) = build(&rates);
        let cutoff = MonthKey::new(2025, 4).unwrap();
        let before: Vec<_> = run_backtest(&series, &classes, cutoff)
            .into_iter()
            .filter(|r| r.month == cutoff)
            .collect();

        let mut altered = rates;
        altered[4].1 = 0.2;
        let (series2, classes2) = build(&altered);
        let after: Vec<_> = run_backtest(&series2, &classes2, cutoff)
            .into_iter()
            .filter(|r| r.month == cutoff)
            .collect();

        assert!(!before.is_empty());
        assert_eq!(before, after);
    }

    #[test]
    fn summary_reports_mape_and_bias() {
        let m = MonthKey::new(2025, 6).unwrap();
        let results = vec![
            BacktestResult { month: m, checkpoint: 30, days_before: 30, prediction: 110.0, actual: 100.0 },
            BacktestResult { month: m, checkpoint: 30, days_before: 29, prediction: 80.0, actual: 100.0 },
            BacktestResult { month: m, checkpoint: 7, days_before: 7, prediction: 100.0, actual: 100.0 },
        ];
        let summary = summarize_backtest(&results);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].checkpoint, 30);
        assert_eq!(summary[0].count, 2);
        assert!((summary[0].mape - 15.0).abs() < 1e-9);
        assert!((summary[0].bias_pct + 5.0).abs() < 1e-9);
        assert_eq!(summary[1].mape, 0.0);
    }

    #[test]
    fn nothing_after_cutoff_yields_empty() {
        let (series, classes) = build(&[(1, 0.01), (2, 0.01)]);
        assert!(run_backtest(&series, &classes, MonthKey::new(2025, 4).unwrap()).is_empty());
    }
}
