//! Historical vs current month classification.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::debug;

use crate::domain::{ClosingValue, DailySnapshot, MonthKey, MonthSeries, CLOSING_TOLERANCE_DAYS};

/// Month sets derived from a `MonthSeries`.
#[derive(Debug, Clone, Default)]
pub struct MonthClasses {
    /// Closed months with a usable actual close, chronological.
    pub historical: Vec<MonthKey>,
    /// Months still open (or closed without a usable actual), chronological.
    pub current: Vec<MonthKey>,
    pub closing_values: BTreeMap<MonthKey, ClosingValue>,
}

impl MonthClasses {
    pub fn is_historical(&self, month: MonthKey) -> bool {
        self.historical.binary_search(&month).is_ok()
    }

    pub fn closing_value(&self, month: MonthKey) -> Option<&ClosingValue> {
        self.closing_values.get(&month)
    }
}

/// The point with the smallest `|days_before_close|`, provided it is at most 5.
///
/// Ties keep the earlier point.
pub fn actual_closing_value(trajectory: &[DailySnapshot]) -> Option<ClosingValue> {
    let mut best: Option<&DailySnapshot> = None;
    for p in trajectory {
        if p.days_before_close.abs() > CLOSING_TOLERANCE_DAYS {
            continue;
        }
        if best.is_none_or(|b| p.days_before_close.abs() < b.days_before_close.abs()) {
            best = Some(p);
        }
    }
    best.map(|p| ClosingValue {
        days_before_close: p.days_before_close,
        raw: p.raw_pipeline,
        weighted: p.weighted_pipeline,
    })
}

/// Split months into historical and current.
///
/// A month is historical iff it ended before `as_of` and has an actual closing
/// value with positive weighted pipeline. Every other month with a non-empty
/// trajectory is current.
pub fn classify_months(series: &MonthSeries, as_of: DateTime<Utc>) -> MonthClasses {
    let mut classes = MonthClasses::default();

    for (month, trajectory) in series {
        if trajectory.is_empty() {
            continue;
        }
        let closing = actual_closing_value(trajectory);
        if let Some(value) = closing {
            classes.closing_values.insert(*month, value);
        }

        let closed = month.end_instant() < as_of;
        match closing {
            Some(value) if closed && value.weighted > 0.0 => classes.historical.push(*month),
            _ => classes.current.push(*month),
        }
    }

    debug!(
        "classified months: historical={} current={}",
        classes.historical.len(),
        classes.current.len()
    );
    classes
}
