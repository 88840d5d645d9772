//! Goal-seek: what uniform daily lift would take a month to a chosen close?
//!
//! Starting from the latest point, the base projection compounds the smoothed
//! curve to day `0`. The lift is the constant extra daily growth that scales
//! the base forecast onto the goal:
//!
//! ```text
//! lift = (goal / base_forecast)^(1 / days_to_close) - 1
//! ```
//!
//! and every projected day grows by `(1 + rate_d) * (1 + lift)`. The lift
//! multiplies each day's growth factor rather than being added to the rate
//! (`1 + rate_d + lift`), so the last projected point lands on the goal exactly.
//!
//! A goal that is not a positive finite number is refused like any other
//! unusable input.

use chrono::Duration;
use log::info;
use serde::Serialize;

use crate::analysis::peaks::PeakDecline;
use crate::domain::{DailySnapshot, GrowthCurve, MonthKey, Trajectory};
use crate::models::project_to_close;
use crate::series::latest_point;

pub const TOP_GOAL_ANALOGS: usize = 2;

const CLOSE_WEIGHT: f64 = 0.6;
const PEAK_WEIGHT: f64 = 0.3;
const TIMING_WEIGHT: f64 = 0.1;

/// Parameters of an accepted goal-seek.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalSeekPlan {
    pub goal: f64,
    pub starting_value: f64,
    pub days_to_close: i64,
    pub base_forecast: f64,
    pub required_total_growth: f64,
    pub required_daily_lift: f64,
}

/// Goal-seek output: the input trajectory plus projected points.
///
/// When the request is refused, `plan` is `None` and `trajectory` is the input unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalSeekResult {
    pub trajectory: Trajectory,
    pub plan: Option<GoalSeekPlan>,
}

/// The (close, peak, timing) triple the analog ranking compares against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GoalSeekTarget {
    pub goal: f64,
    pub peak_value: f64,
    pub days_at_peak: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalSeekAnalog {
    pub month: MonthKey,
    pub score: f64,
    pub actual_close: f64,
    pub peak_value: f64,
    pub days_at_peak: i64,
}

/// Re-project `trajectory` so that it closes at `goal`.
pub fn goal_seek(trajectory: &[DailySnapshot], goal: f64, curve: &GrowthCurve) -> GoalSeekResult {
    let refused = || GoalSeekResult {
        trajectory: trajectory.to_vec(),
        plan: None,
    };

    let Some(latest) = latest_point(trajectory) else {
        return refused();
    };
    let starting_value = latest.weighted_pipeline;
    let days_to_close = latest.days_before_close;
    if !(goal.is_finite() && goal > 0.0) || starting_value <= 0.0 || days_to_close <= 0 {
        info!("goal-seek refused: goal={goal} starting_value={starting_value:.2} days_to_close={days_to_close}");
        return refused();
    }

    let base_forecast = project_to_close(starting_value, days_to_close, curve);
    if base_forecast <= 0.0 || !base_forecast.is_finite() {
        info!("goal-seek refused: base_forecast={base_forecast:.2}");
        return refused();
    }

    let required_total_growth = goal / base_forecast;
    let required_daily_lift = required_total_growth.powf(1.0 / days_to_close as f64) - 1.0;

    let mut out = trajectory.to_vec();
    let mut value = starting_value;
    for (step, day) in (0..days_to_close).rev().enumerate() {
        value *= (1.0 + curve.rate(day)) * (1.0 + required_daily_lift);
        out.push(DailySnapshot {
            snapshot_date: latest.snapshot_date + Duration::days(step as i64 + 1),
            days_before_close: day,
            raw_pipeline: latest.raw_pipeline * value / starting_value,
            weighted_pipeline: value,
        });
    }

    GoalSeekResult {
        trajectory: out,
        plan: Some(GoalSeekPlan {
            goal,
            starting_value,
            days_to_close,
            base_forecast,
            required_total_growth,
            required_daily_lift,
        }),
    }
}

/// Derive the analog-ranking target from a goal-seek trajectory.
///
/// The peak is the highest weighted point (earliest on ties).
pub fn goal_seek_target(goal: f64, trajectory: &[DailySnapshot]) -> Option<GoalSeekTarget> {
    let mut peak: Option<&DailySnapshot> = None;
    for p in trajectory {
        if peak.is_none_or(|b| p.weighted_pipeline > b.weighted_pipeline) {
            peak = Some(p);
        }
    }
    peak.map(|p| GoalSeekTarget {
        goal,
        peak_value: p.weighted_pipeline,
        days_at_peak: p.days_before_close,
    })
}

/// Relative distance `|a - b| / b`, or `0` when `b` is not positive.
fn rel_distance(a: f64, b: f64) -> f64 {
    if b > 0.0 { (a - b).abs() / b } else { 0.0 }
}

/// Rank historical months (via their peak rows) against a goal-seek target, best first.
///
/// ```text
/// score = 0.6 * |close - goal| / goal + 0.3 * |peak - peak_value| / peak_value
///       + 0.1 * |days_at_peak - days| / days
/// ```
pub fn find_similar_for_goal_seek(target: &GoalSeekTarget, peaks: &[PeakDecline]) -> Vec<GoalSeekAnalog> {
    let mut scored: Vec<GoalSeekAnalog> = peaks
        .iter()
        .map(|p| {
            let score = CLOSE_WEIGHT * rel_distance(p.actual_weighted, target.goal)
                + PEAK_WEIGHT * rel_distance(p.peak_weighted, target.peak_value)
                + TIMING_WEIGHT * rel_distance(p.days_before_closing as f64, target.days_at_peak as f64);
            GoalSeekAnalog {
                month: p.month,
                score,
                actual_close: p.actual_weighted,
                peak_value: p.peak_weighted,
                days_at_peak: p.days_before_closing,
            }
        })
        .collect();

    scored.sort_by(|a, b| a.score.total_cmp(&b.score));
    scored.truncate(TOP_GOAL_ANALOGS);
    scored
}
