//! Historical analog search.
//!
//! A candidate month is compared with the target at fixed days-before-close
//! checkpoints. At each checkpoint both trajectories contribute the point
//! nearest to it (within three days) and we take the percent difference of
//! their weighted pipelines. The score blends trajectory shape with how far the
//! candidate's actual close is from the target's expected close:
//!
//! ```text
//! score = 0.7 * (|mean(pct_diff)| + std(pct_diff)) + 0.3 * |close - forecast| / forecast
//! ```
//!
//! Lower is more similar.

use log::debug;
use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{DailySnapshot, MonthKey, MonthSeries};
use crate::math::{mean, population_std};
use crate::series::{nearest_point, MonthClasses};

pub const SIMILARITY_CHECKPOINTS: [i64; 6] = [85, 75, 60, 45, 30, 15];
pub const SIMILARITY_TOLERANCE_DAYS: i64 = 3;
pub const TOP_ANALOGS: usize = 3;

const TRAJECTORY_WEIGHT: f64 = 0.7;
const CLOSING_WEIGHT: f64 = 0.3;

/// Comparison at one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointDiff {
    pub checkpoint: i64,
    pub target_days: i64,
    pub candidate_days: i64,
    pub target_value: f64,
    pub candidate_value: f64,
    /// `(target - candidate) / candidate * 100`.
    pub pct_diff: f64,
}

/// A scored historical analog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarMonth {
    pub month: MonthKey,
    pub score: f64,
    /// `|mean(pct_diff)| + std(pct_diff)`.
    pub trajectory_distance: f64,
    /// `|close - forecast| / forecast`.
    pub closing_distance: f64,
    pub actual_close: f64,
    pub checkpoints: Vec<CheckpointDiff>,
}

/// Match checkpoints between two trajectories.
pub fn checkpoint_diffs(target: &[DailySnapshot], candidate: &[DailySnapshot]) -> Vec<CheckpointDiff> {
    SIMILARITY_CHECKPOINTS
        .iter()
        .filter_map(|&checkpoint| {
            let t = nearest_point(target, checkpoint, SIMILARITY_TOLERANCE_DAYS)?;
            let c = nearest_point(candidate, checkpoint, SIMILARITY_TOLERANCE_DAYS)?;
            if c.weighted_pipeline <= 0.0 {
                return None;
            }
            Some(CheckpointDiff {
                checkpoint,
                target_days: t.days_before_close,
                candidate_days: c.days_before_close,
                target_value: t.weighted_pipeline,
                candidate_value: c.weighted_pipeline,
                pct_diff: (t.weighted_pipeline - c.weighted_pipeline) / c.weighted_pipeline * 100.0,
            })
        })
        .collect()
}

/// Score one candidate. `None` if no checkpoint matched or `forecast_value` is not positive.
pub fn score_candidate(
    month: MonthKey,
    target: &[DailySnapshot],
    candidate: &[DailySnapshot],
    actual_close: f64,
    forecast_value: f64,
) -> Option<SimilarMonth> {
    if forecast_value <= 0.0 {
        return None;
    }
    let checkpoints = checkpoint_diffs(target, candidate);
    let diffs: Vec<f64> = checkpoints.iter().map(|c| c.pct_diff).collect();
    let trajectory_distance = mean(&diffs)?.abs() + population_std(&diffs)?;
    let closing_distance = (actual_close - forecast_value).abs() / forecast_value;

    Some(SimilarMonth {
        month,
        score: TRAJECTORY_WEIGHT * trajectory_distance + CLOSING_WEIGHT * closing_distance,
        trajectory_distance,
        closing_distance,
        actual_close,
        checkpoints,
    })
}

/// The most similar historical months to `target`, best first.
///
/// Candidates are historical months on or after `cutoff`, excluding `exclude`
/// (the target month itself when it is historical).
pub fn find_similar_months(
    target: &[DailySnapshot],
    forecast_value: f64,
    exclude: Option<MonthKey>,
    series: &MonthSeries,
    classes: &MonthClasses,
    cutoff: MonthKey,
) -> Vec<SimilarMonth> {
    let mut scored: Vec<SimilarMonth> = classes
        .historical
        .par_iter()
        .filter(|m| **m >= cutoff && Some(**m) != exclude)
        .filter_map(|m| {
            let candidate = series.get(m)?;
            let close = classes.closing_value(*m)?;
            score_candidate(*m, target, candidate, close.weighted, forecast_value)
        })
        .collect();

    if scored.is_empty() {
        debug!("similarity: no scorable candidates on or after {cutoff}");
    }

    scored.sort_by(|a, b| a.score.total_cmp(&b.score));
    scored.truncate(TOP_ANALOGS);
    scored
}
