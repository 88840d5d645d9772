//! Shared load-and-analyse pipeline used by every subcommand.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! rows -> observations -> month series -> classification -> growth curve
//!
//! A `Dataset` can only be obtained by loading rows, so analyses can never run
//! against missing state. Loading again builds a fresh `Dataset`; nothing is
//! patched in place.

use std::path::Path;

use log::info;

use crate::analysis::{
    analyze_peaks, find_similar_for_goal_seek, find_similar_months, forecast_current_months, forecast_month,
    goal_seek, goal_seek_target, run_backtest, BacktestResult, GoalSeekAnalog, GoalSeekResult, MonthForecast,
    PeakDecline, SimilarMonth,
};
use crate::domain::{AnalysisConfig, DailySnapshot, GrowthCurve, MonthKey, MonthSeries, Observation};
use crate::error::AppError;
use crate::io::ingest::{load_observations, read_observations, IngestedData};
use crate::models::train_growth_curve;
use crate::series::{build_month_series, classify_months, MonthClasses};

/// Everything derived from one input file.
#[derive(Debug, Clone)]
pub struct Dataset {
    config: AnalysisConfig,
    ingest: IngestedData,
    series: MonthSeries,
    classes: MonthClasses,
    curve: GrowthCurve,
}

impl Dataset {
    /// Build all derived state from parsed observations.
    ///
    /// Zero observations yield an empty dataset whose analyses return nothing.
    pub fn load(ingest: IngestedData, config: AnalysisConfig) -> Self {
        let series = build_month_series(&ingest.observations);
        let classes = classify_months(&series, config.as_of);
        let curve = train_growth_curve(&series, &classes.historical);

        info!(
            "dataset: months={} historical={} current={}",
            series.len(),
            classes.historical.len(),
            classes.current.len()
        );

        Self {
            config,
            ingest,
            series,
            classes,
            curve,
        }
    }

    pub fn from_csv_path(path: &Path, config: AnalysisConfig) -> Result<Self, AppError> {
        let ingest = load_observations(path, &config)?;
        Ok(Self::load(ingest, config))
    }

    pub fn from_csv_text(text: &str, config: AnalysisConfig) -> Result<Self, AppError> {
        let ingest = read_observations(text.as_bytes(), &config)?;
        Ok(Self::load(ingest, config))
    }

    pub fn is_empty(&self) -> bool {
        self.ingest.observations.is_empty()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn ingest(&self) -> &IngestedData {
        &self.ingest
    }

    pub fn observations(&self) -> &[Observation] {
        &self.ingest.observations
    }

    pub fn series(&self) -> &MonthSeries {
        &self.series
    }

    pub fn classes(&self) -> &MonthClasses {
        &self.classes
    }

    /// Growth curve trained on every historical month.
    pub fn curve(&self) -> &GrowthCurve {
        &self.curve
    }

    pub fn trajectory(&self, month: MonthKey) -> Option<&[DailySnapshot]> {
        self.series.get(&month).map(Vec::as_slice)
    }

    pub fn forecasts(&self) -> Vec<MonthForecast> {
        forecast_current_months(&self.series, &self.classes, &self.curve)
    }

    pub fn forecast(&self, month: MonthKey) -> Option<MonthForecast> {
        forecast_month(month, self.trajectory(month)?, &self.curve)
    }

    pub fn backtest(&self) -> Vec<BacktestResult> {
        run_backtest(&self.series, &self.classes, self.config.backtest_cutoff())
    }

    pub fn peaks(&self) -> Vec<PeakDecline> {
        analyze_peaks(&self.ingest.observations, &self.classes)
    }

    /// Historical analogs of `month`.
    ///
    /// The expected close is the forecast for an open month and the actual close
    /// for a historical one. An open month without a recommended forecast has no analogs.
    pub fn similar_months(&self, month: MonthKey) -> Vec<SimilarMonth> {
        let Some(trajectory) = self.trajectory(month) else {
            return Vec::new();
        };
        let expected = if self.classes.is_historical(month) {
            self.classes.closing_value(month).map(|c| c.weighted)
        } else {
            self.forecast(month).and_then(|f| f.forecast())
        };
        match expected {
            Some(value) => self.similar_to_trajectory(trajectory, value, Some(month)),
            None => Vec::new(),
        }
    }

    /// Historical analogs of an arbitrary (e.g. goal-seek) trajectory.
    pub fn similar_to_trajectory(
        &self,
        trajectory: &[DailySnapshot],
        expected_close: f64,
        exclude: Option<MonthKey>,
    ) -> Vec<SimilarMonth> {
        find_similar_months(
            trajectory,
            expected_close,
            exclude,
            &self.series,
            &self.classes,
            self.config.similarity_cutoff(),
        )
    }

    /// Goal-seek `month` to `goal`. `None` if the month has no trajectory.
    pub fn goal_seek(&self, month: MonthKey, goal: f64) -> Option<GoalSeekResult> {
        Some(goal_seek(self.trajectory(month)?, goal, &self.curve))
    }

    /// Historical months closest to a goal-seek outcome.
    pub fn goal_seek_analogs(&self, goal: f64, result: &GoalSeekResult) -> Vec<GoalSeekAnalog> {
        let Some(target) = goal_seek_target(goal, &result.trajectory) else {
            return Vec::new();
        };
        find_similar_for_goal_seek(&target, &self.peaks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn config() -> AnalysisConfig {
        AnalysisConfig::new(2025, Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap())
    }

    #[test]
    fn empty_input_gives_empty_results() {
        let text = "snapshot_date,closing_date,total_amount,stage\nbad,row,x,y\n";
        let ds = Dataset::from_csv_text(text, config()).unwrap();
        assert!(ds.is_empty());
        assert!(ds.forecasts().is_empty());
        assert!(ds.backtest().is_empty());
        assert!(ds.peaks().is_empty());
        assert!(ds.similar_months(MonthKey::new(2025, 3).unwrap()).is_empty());
        assert!(ds.goal_seek(MonthKey::new(2025, 3).unwrap(), 10.0).is_none());
        assert!(ds.curve().smoothed.iter().all(|r| *r == 0.0));
    }

    #[test]
    fn open_month_is_forecast() {
        let text = "snapshot_date,closing_date,total_amount,stage\n\
                    2025-03-10T12:00:00Z,03/31/2025,\"$1,000\",FUNDED\n\
                    2025-03-11T12:00:00Z,03/31/2025,\"$1,100\",FUNDED\n";
        let ds = Dataset::from_csv_text(text, config()).unwrap();
        let forecasts = ds.forecasts();
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].weighted_pipeline, 1100.0);
        // No history: a flat zero curve keeps the latest value.
        assert_eq!(forecasts[0].forecast(), Some(1100.0));

        let march = MonthKey::new(2025, 3).unwrap();
        let refused = ds.goal_seek(march, -10.0).unwrap();
        assert!(refused.plan.is_none());
        assert_eq!(refused.trajectory, ds.trajectory(march).unwrap().to_vec());
    }
}
