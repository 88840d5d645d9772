//! Per-month daily aggregation.
//!
//! Observations are summed per exact snapshot instant, then each calendar day
//! (UTC) keeps only its latest instant. Earlier snapshots of the same day are
//! discarded, not added.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{days_before_close, DailySnapshot, MonthKey, MonthSeries, Observation, Trajectory};

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    raw: f64,
    weighted: f64,
}

/// Build the trajectory of every closing month present in `observations`.
pub fn build_month_series(observations: &[Observation]) -> MonthSeries {
    let mut by_month: BTreeMap<MonthKey, BTreeMap<DateTime<Utc>, Totals>> = BTreeMap::new();
    for obs in observations {
        let totals = by_month
            .entry(obs.closing_month)
            .or_default()
            .entry(obs.snapshot)
            .or_default();
        totals.raw += obs.raw_amount;
        totals.weighted += obs.weighted_amount;
    }

    by_month
        .into_iter()
        .map(|(month, instants)| (month, daily_trajectory(month, &instants)))
        .collect()
}

fn daily_trajectory(month: MonthKey, instants: &BTreeMap<DateTime<Utc>, Totals>) -> Trajectory {
    // Instants iterate in ascending order, so the last insert per day is the latest.
    let mut per_day: BTreeMap<NaiveDate, (DateTime<Utc>, Totals)> = BTreeMap::new();
    for (instant, totals) in instants {
        per_day.insert(instant.date_naive(), (*instant, *totals));
    }

    let mut trajectory: Trajectory = per_day
        .into_values()
        .map(|(instant, totals)| DailySnapshot {
            snapshot_date: instant,
            days_before_close: days_before_close(instant, month),
            raw_pipeline: totals.raw,
            weighted_pipeline: totals.weighted,
        })
        .collect();

    trajectory.sort_by(|a, b| {
        b.days_before_close
            .cmp(&a.days_before_close)
            .then(a.snapshot_date.cmp(&b.snapshot_date))
    });
    trajectory
}

/// The point with the most recent snapshot date.
pub fn latest_point(trajectory: &[DailySnapshot]) -> Option<&DailySnapshot> {
    trajectory.iter().max_by_key(|p| p.snapshot_date)
}

/// The point whose days-before-close is closest to `target`, if within `tolerance`.
///
/// Ties go to the earlier point in the trajectory.
pub fn nearest_point(trajectory: &[DailySnapshot], target: i64, tolerance: i64) -> Option<&DailySnapshot> {
    let mut best: Option<(&DailySnapshot, i64)> = None;
    for p in trajectory {
        let dist = (p.days_before_close - target).abs();
        if dist > tolerance {
            continue;
        }
        if best.is_none_or(|(_, d)| dist < d) {
            best = Some((p, dist));
        }
    }
    best.map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::domain::Stage;

    fn obs(month: MonthKey, snapshot: DateTime<Utc>, raw: f64, weighted: f64) -> Observation {
        Observation {
            snapshot,
            closing_month: month,
            days_before_close: days_before_close(snapshot, month),
            raw_amount: raw,
            stage: Stage::Funded,
            weighted_amount: weighted,
        }
    }

    #[test]
    fn same_instant_sums_and_last_of_day_wins() {
        let march = MonthKey::new(2025, 3).unwrap();
        let morning = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2025, 3, 11, 9, 0, 0).unwrap();

        let input = vec![
            obs(march, morning, 100.0, 50.0),
            obs(march, morning, 100.0, 50.0),
            obs(march, evening, 30.0, 20.0),
            obs(march, evening, 40.0, 10.0),
            obs(march, next_day, 500.0, 400.0),
        ];
        let series = build_month_series(&input);
        let traj = &series[&march];

        assert_eq!(traj.len(), 2);
        assert_eq!(traj[0].snapshot_date, evening);
        assert_eq!(traj[0].raw_pipeline, 70.0);
        assert_eq!(traj[0].weighted_pipeline, 30.0);
        assert_eq!(traj[0].days_before_close, 22);
        assert_eq!(traj[1].days_before_close, 21);
        assert!(traj[0].days_before_close > traj[1].days_before_close);
    }

    #[test]
    fn months_are_kept_apart() {
        let march = MonthKey::new(2025, 3).unwrap();
        let april = MonthKey::new(2025, 4).unwrap();
        let t = Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap();
        let series = build_month_series(&[obs(march, t, 1.0, 1.0), obs(april, t, 2.0, 2.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series[&april][0].raw_pipeline, 2.0);
        assert_eq!(series[&april][0].days_before_close, 52);
    }

    #[test]
    fn nearest_point_respects_tolerance() {
        let march = MonthKey::new(2025, 3).unwrap();
        let points: Vec<_> = [40, 33, 29]
            .iter()
            .map(|d| DailySnapshot {
                snapshot_date: march.end_instant() - chrono::Duration::days(*d),
                days_before_close: *d,
                raw_pipeline: 0.0,
                weighted_pipeline: 0.0,
            })
            .collect();
        assert_eq!(nearest_point(&points, 30, 3).unwrap().days_before_close, 29);
        assert_eq!(nearest_point(&points, 31, 3).unwrap().days_before_close, 33);
        assert!(nearest_point(&points, 45, 3).is_none());
        assert_eq!(latest_point(&points).unwrap().days_before_close, 29);
    }
}
