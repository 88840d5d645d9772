//! Empirical daily growth-rate model.
//!
//! For every pair of consecutive trajectory points at most three days apart we
//! compute the implied per-day compounding rate of the weighted pipeline:
//!
//! ```text
//! growth = (w_cur / w_prev)^(1 / gap) - 1
//! ```
//!
//! The same rate is attributed to every day slot the gap spans. Each slot's raw
//! rate is the median of what it received, and the final curve is a 5-point
//! moving average of those medians.

use log::debug;

use crate::domain::{DailySnapshot, GrowthCurve, MonthKey, MonthSeries, CURVE_DAYS};
use crate::math::{clamped_moving_average, median};

/// Largest gap (days) between consecutive points that still yields a rate.
pub const MAX_GAP_DAYS: i64 = 3;
/// Rates at or beyond `±OUTLIER_BOUND` are discarded.
pub const OUTLIER_BOUND: f64 = 0.5;
/// Half-width of the smoothing window.
pub const SMOOTHING_RADIUS: usize = 2;

/// Implied daily growth between two consecutive points.
///
/// Returns `(growth, gap_days)`, or `None` if the gap is outside `1..=3`, the
/// previous value is not positive, or the rate is an outlier.
pub fn transition_growth(prev: &DailySnapshot, cur: &DailySnapshot) -> Option<(f64, i64)> {
    let gap = prev.days_before_close - cur.days_before_close;
    if !(1..=MAX_GAP_DAYS).contains(&gap) || prev.weighted_pipeline <= 0.0 {
        return None;
    }
    let growth = (cur.weighted_pipeline / prev.weighted_pipeline).powf(1.0 / gap as f64) - 1.0;
    if !growth.is_finite() || growth <= -OUTLIER_BOUND || growth >= OUTLIER_BOUND {
        return None;
    }
    Some((growth, gap))
}

/// Learn a curve from the trajectories of `months` (months missing from `series` are ignored).
pub fn train_growth_curve(series: &MonthSeries, months: &[MonthKey]) -> GrowthCurve {
    growth_curve_from_trajectories(months.iter().filter_map(|m| series.get(m)).map(Vec::as_slice))
}

/// Learn a curve from arbitrary trajectories.
///
/// The result only depends on the multiset of transitions, not on the order
/// in which trajectories are supplied.
pub fn growth_curve_from_trajectories<'a, I>(trajectories: I) -> GrowthCurve
where
    I: IntoIterator<Item = &'a [DailySnapshot]>,
{
    let mut slots: [Vec<f64>; CURVE_DAYS] = std::array::from_fn(|_| Vec::new());
    let mut pairs = 0usize;

    for trajectory in trajectories {
        for window in trajectory.windows(2) {
            let (prev, cur) = (&window[0], &window[1]);
            let Some((growth, gap)) = transition_growth(prev, cur) else {
                continue;
            };
            pairs += 1;
            for day in cur.days_before_close..cur.days_before_close + gap {
                if let Ok(idx) = usize::try_from(day) {
                    if let Some(slot) = slots.get_mut(idx) {
                        slot.push(growth);
                    }
                }
            }
        }
    }

    let median_curve: Vec<f64> = slots.iter().map(|s| median(s).unwrap_or(0.0)).collect();
    let samples: Vec<usize> = slots.iter().map(Vec::len).collect();
    let smoothed = clamped_moving_average(&median_curve, SMOOTHING_RADIUS);

    debug!(
        "growth curve: pairs={pairs} days_with_data={}",
        samples.iter().filter(|n| **n > 0).count()
    );

    GrowthCurve {
        median: median_curve,
        smoothed,
        samples,
    }
}

/// Compound `value` through the smoothed rates of days `days_to_close-1` down to `0`.
///
/// `days_to_close <= 0` applies no growth.
pub fn project_to_close(value: f64, days_to_close: i64, curve: &GrowthCurve) -> f64 {
    (0..days_to_close.max(0))
        .rev()
        .fold(value, |v, day| v * (1.0 + curve.rate(day)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn traj(points: &[(i64, f64)]) -> Vec<DailySnapshot> {
        let end = Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap();
        points
            .iter()
            .map(|(d, w)| DailySnapshot {
                snapshot_date: end - Duration::days(*d),
                days_before_close: *d,
                raw_pipeline: *w,
                weighted_pipeline: *w,
            })
            .collect()
    }

    #[test]
    fn doubling_over_two_days_fills_both_slots() {
        let t = traj(&[(12, 100.0), (10, 200.0)]);
        let curve = growth_curve_from_trajectories([t.as_slice()]);
        let expected = 2f64.sqrt() - 1.0;
        // 0.4142 is inside the outlier bound.
        assert!((curve.median[10] - expected).abs() < 1e-12);
        assert!((curve.median[11] - expected).abs() < 1e-12);
        assert_eq!(curve.median[12], 0.0);
        assert_eq!(curve.samples[10], 1);
        assert_eq!(curve.samples[11], 1);
    }

    #[test]
    fn gaps_zero_bases_and_outliers_are_ignored() {
        // Gap of 4 days.
        assert!(transition_growth(&traj(&[(20, 100.0)])[0], &traj(&[(16, 110.0)])[0]).is_none());
        // Zero previous value.
        assert!(transition_growth(&traj(&[(20, 0.0)])[0], &traj(&[(19, 110.0)])[0]).is_none());
        // +60% in a day.
        assert!(transition_growth(&traj(&[(20, 100.0)])[0], &traj(&[(19, 160.0)])[0]).is_none());
        // -50% exactly is rejected too.
        assert!(transition_growth(&traj(&[(20, 100.0)])[0], &traj(&[(19, 50.0)])[0]).is_none());
        let (g, gap) = transition_growth(&traj(&[(20, 100.0)])[0], &traj(&[(19, 110.0)])[0]).unwrap();
        assert!((g - 0.1).abs() < 1e-12);
        assert_eq!(gap, 1);
    }

    #[test]
    fn negative_days_are_not_attributed() {
        let t = traj(&[(1, 100.0), (-1, 121.0)]);
        let curve = growth_curve_from_trajectories([t.as_slice()]);
        assert!((curve.median[0] - 0.1).abs() < 1e-12);
        assert_eq!(curve.samples.iter().sum::<usize>(), 1);
    }

    #[test]
    fn training_order_does_not_matter() {
        let a = traj(&[(30, 100.0), (29, 110.0), (27, 115.0), (26, 118.0)]);
        let b = traj(&[(30, 50.0), (28, 60.0), (27, 59.0)]);
        let c = traj(&[(29, 10.0), (28, 10.5), (26, 11.0)]);
        let forward = growth_curve_from_trajectories([a.as_slice(), b.as_slice(), c.as_slice()]);
        let backward = growth_curve_from_trajectories([c.as_slice(), a.as_slice(), b.as_slice()]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn median_across_months_then_smoothing() {
        let a = traj(&[(41, 100.0), (40, 101.0)]);
        let b = traj(&[(41, 100.0), (40, 103.0)]);
        let c = traj(&[(41, 100.0), (40, 110.0)]);
        let curve = growth_curve_from_trajectories([a.as_slice(), b.as_slice(), c.as_slice()]);
        assert!((curve.median[40] - 0.03).abs() < 1e-12);
        assert!((curve.smoothed[40] - 0.03 / 5.0).abs() < 1e-12);
        assert!((curve.smoothed[38] - 0.03 / 5.0).abs() < 1e-12);
        assert_eq!(curve.smoothed[37], 0.0);
    }

    #[test]
    fn projection_compounds_each_day_once() {
        let curve = GrowthCurve::flat(0.01);
        assert_eq!(project_to_close(100.0, 0, &curve), 100.0);
        assert_eq!(project_to_close(100.0, -3, &curve), 100.0);
        assert!((project_to_close(100.0, 3, &curve) - 100.0 * 1.01f64.powi(3)).abs() < 1e-9);
    }

    #[test]
    fn train_uses_only_requested_months() {
        let jan = MonthKey::new(2025, 1).unwrap();
        let feb = MonthKey::new(2025, 2).unwrap();
        let mut series = MonthSeries::new();
        series.insert(jan, traj(&[(5, 100.0), (4, 110.0)]));
        series.insert(feb, traj(&[(5, 100.0), (4, 130.0)]));
        let curve = train_growth_curve(&series, &[jan]);
        assert!((curve.median[4] - 0.1).abs() < 1e-12);
    }
}
