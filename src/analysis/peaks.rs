//! Peak pipeline and decline-to-close for historical months.
//!
//! The peak is looked up on the raw observations rather than the daily
//! trajectory, so intra-day snapshots that the aggregation discards still count.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{days_before_close, ClosingValue, MonthKey, Observation};
use crate::series::MonthClasses;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakDecline {
    pub month: MonthKey,
    pub peak_snapshot: DateTime<Utc>,
    /// Days between the peak snapshot and month end (rounded up).
    pub days_before_closing: i64,
    pub peak_raw: f64,
    pub peak_weighted: f64,
    pub actual_raw: f64,
    pub actual_weighted: f64,
    /// `(peak - actual) / peak * 100` on raw values.
    pub raw_decline_pct: f64,
    /// Same on weighted values (`0` when the weighted peak is not positive).
    pub weighted_decline_pct: f64,
}

/// Find the peak of `month` within the prior calendar month through its own end.
///
/// Every distinct snapshot instant in the window is a candidate, whichever month
/// its records close in; its value is the sum over records closing in `month`.
/// The candidate with the highest raw sum wins (earliest on ties). Returns
/// `None` when no instant falls in the window or the peak raw value is zero.
pub fn analyze_peak(month: MonthKey, observations: &[Observation], close: &ClosingValue) -> Option<PeakDecline> {
    let window_start = month.previous().start_instant();
    let window_end = month.end_instant();

    let mut instants: BTreeMap<DateTime<Utc>, (f64, f64)> = BTreeMap::new();
    for obs in observations {
        if obs.snapshot < window_start || obs.snapshot > window_end {
            continue;
        }
        let entry = instants.entry(obs.snapshot).or_insert((0.0, 0.0));
        if obs.closing_month == month {
            entry.0 += obs.raw_amount;
            entry.1 += obs.weighted_amount;
        }
    }

    let mut peak: Option<(DateTime<Utc>, f64, f64)> = None;
    for (instant, (raw, weighted)) in instants {
        if peak.is_none_or(|(_, best, _)| raw > best) {
            peak = Some((instant, raw, weighted));
        }
    }

    let (peak_snapshot, peak_raw, peak_weighted) = peak?;
    if peak_raw <= 0.0 {
        return None;
    }

    let weighted_decline_pct = if peak_weighted > 0.0 {
        (peak_weighted - close.weighted) / peak_weighted * 100.0
    } else {
        0.0
    };

    Some(PeakDecline {
        month,
        peak_snapshot,
        days_before_closing: days_before_close(peak_snapshot, month),
        peak_raw,
        peak_weighted,
        actual_raw: close.raw,
        actual_weighted: close.weighted,
        raw_decline_pct: (peak_raw - close.raw) / peak_raw * 100.0,
        weighted_decline_pct,
    })
}

/// Peak/decline rows for every historical month, chronologically.
pub fn analyze_peaks(observations: &[Observation], classes: &MonthClasses) -> Vec<PeakDecline> {
    classes
        .historical
        .iter()
        .filter_map(|m| analyze_peak(*m, observations, classes.closing_value(*m)?))
        .collect()
}
