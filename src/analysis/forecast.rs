//! Month-end forecasts for open months.
//!
//! The latest weighted pipeline of a month is compounded forward one day at a
//! time through the smoothed growth curve until days-before-close reaches `0`.
//! Every step is recorded so the projection can be audited line by line.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info};
use serde::Serialize;

use crate::domain::{DailySnapshot, GrowthCurve, MonthKey, MonthSeries, MAX_DAYS_BEFORE_CLOSE};
use crate::series::{latest_point, MonthClasses};

/// One compounding step of a projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStep {
    /// Days-before-close whose rate was applied.
    pub day: i64,
    /// Simulated calendar date of the step.
    pub date: NaiveDate,
    pub rate: f64,
    pub value_before: f64,
    pub value_after: f64,
}

/// Result of projecting a month to close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub forecast: f64,
    /// `forecast / latest_weighted - 1` (`0` when the latest value is not positive).
    pub total_projected_growth: f64,
    pub steps: Vec<DailyStep>,
}

/// Forecast summary for one open month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthForecast {
    pub month: MonthKey,
    pub latest_snapshot: DateTime<Utc>,
    pub raw_pipeline: f64,
    pub weighted_pipeline: f64,
    pub days_to_close: i64,
    /// `None` when the month is too far from close to forecast reliably.
    pub projection: Option<Projection>,
}

impl MonthForecast {
    pub fn forecast(&self) -> Option<f64> {
        self.projection.as_ref().map(|p| p.forecast)
    }
}

/// Project `start` from `days_to_close` down to day `0`, recording each step.
///
/// `start_date` is the calendar date of the starting point; each step advances it by a day.
pub fn project_with_steps(start: f64, days_to_close: i64, start_date: NaiveDate, curve: &GrowthCurve) -> Projection {
    let mut value = start;
    let mut date = start_date;
    let mut steps = Vec::with_capacity(days_to_close.max(0) as usize);

    for day in (0..days_to_close.max(0)).rev() {
        let rate = curve.rate(day);
        let before = value;
        value *= 1.0 + rate;
        date += Duration::days(1);
        steps.push(DailyStep {
            day,
            date,
            rate,
            value_before: before,
            value_after: value,
        });
    }

    let total_projected_growth = if start > 0.0 { value / start - 1.0 } else { 0.0 };
    Projection {
        forecast: value,
        total_projected_growth,
        steps,
    }
}

/// Forecast a single month from its trajectory. Returns `None` for an empty trajectory.
pub fn forecast_month(month: MonthKey, trajectory: &[DailySnapshot], curve: &GrowthCurve) -> Option<MonthForecast> {
    let latest = latest_point(trajectory)?;
    let days_to_close = latest.days_before_close;

    let projection = if days_to_close > MAX_DAYS_BEFORE_CLOSE {
        info!("{month}: {days_to_close} days to close, forecast not recommended");
        None
    } else {
        Some(project_with_steps(
            latest.weighted_pipeline,
            days_to_close,
            latest.snapshot_date.date_naive(),
            curve,
        ))
    };

    if let Some(p) = &projection {
        debug!(
            "{month}: latest={:.2} days_to_close={days_to_close} forecast={:.2}",
            latest.weighted_pipeline, p.forecast
        );
    }

    Some(MonthForecast {
        month,
        latest_snapshot: latest.snapshot_date,
        raw_pipeline: latest.raw_pipeline,
        weighted_pipeline: latest.weighted_pipeline,
        days_to_close,
        projection,
    })
}

/// Forecast every current month, chronologically.
pub fn forecast_current_months(series: &MonthSeries, classes: &MonthClasses, curve: &GrowthCurve) -> Vec<MonthForecast> {
    classes
        .current
        .iter()
        .filter_map(|month| forecast_month(*month, series.get(month)?, curve))
        .collect()
}
