//! Shared domain types.
//!
//! These types are small, immutable once built, and serializable so they can be:
//!
//! - passed between the pipeline stages without copying raw rows around
//! - exported to JSON/CSV
//! - reloaded later for comparisons

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Earliest accepted days-before-close (snapshots shortly after month end).
pub const MIN_DAYS_BEFORE_CLOSE: i64 = -5;
/// Latest accepted days-before-close.
pub const MAX_DAYS_BEFORE_CLOSE: i64 = 89;
/// Number of day slots in a growth curve (days-before-close `0..=89`).
pub const CURVE_DAYS: usize = 90;
/// A trajectory point counts as the actual close if it is within this many days of month end.
pub const CLOSING_TOLERANCE_DAYS: i64 = 5;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A calendar month, displayed and parsed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u32 {
        self.month
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self { year: self.year - 1, month: 12 }
        } else {
            Self { year: self.year, month: self.month - 1 }
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self { year: self.year + 1, month: 1 }
        } else {
            Self { year: self.year, month: self.month + 1 }
        }
    }

    /// First instant of the month (00:00:00.000 UTC on day 1).
    pub fn start_instant(self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.first_day().and_time(chrono::NaiveTime::MIN))
    }

    /// Last instant of the month (23:59:59.999 UTC on the last day).
    pub fn end_instant(self) -> DateTime<Utc> {
        self.next().start_instant() - Duration::milliseconds(1)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid month '{s}'. Expected YYYY-MM."))?;
        let year = y
            .parse::<i32>()
            .map_err(|_| format!("Invalid year in month '{s}'."))?;
        let month = m
            .parse::<u32>()
            .map_err(|_| format!("Invalid month number in '{s}'."))?;
        MonthKey::new(year, month).ok_or_else(|| format!("Month out of range in '{s}'."))
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whole days from `instant` to the end of `month`, rounded up.
///
/// A snapshot taken exactly at the month's last instant is `0`; anything during
/// the last calendar day before that instant is `1`.
pub fn days_before_close(instant: DateTime<Utc>, month: MonthKey) -> i64 {
    let millis = (month.end_instant() - instant).num_milliseconds();
    (millis as f64 / MILLIS_PER_DAY).ceil() as i64
}

/// Pipeline stage of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    Funded,
    ReadyForFunding,
    ConditionFulfillment,
    Approved,
    Other(String),
}

/// Canonical form of a stage name: trimmed and uppercased.
pub fn stage_key(label: &str) -> String {
    label.trim().to_uppercase()
}

impl Stage {
    /// Known stages match case-insensitively; other labels keep their trimmed text.
    pub fn parse(label: &str) -> Self {
        match stage_key(label).as_str() {
            "FUNDED" => Stage::Funded,
            "READY_FOR_FUNDING" => Stage::ReadyForFunding,
            "CONDITION_FULFILLMENT" => Stage::ConditionFulfillment,
            "APPROVED" => Stage::Approved,
            _ => Stage::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Stage::Funded => "FUNDED",
            Stage::ReadyForFunding => "READY_FOR_FUNDING",
            Stage::ConditionFulfillment => "CONDITION_FULFILLMENT",
            Stage::Approved => "APPROVED",
            Stage::Other(label) => label,
        }
    }
}

/// Frozen stage → confidence weight table.
///
/// Keys are stored in [`stage_key`] form and lookups use the same form, so
/// stage names match regardless of case or surrounding blanks. Stages not in
/// the table weigh `0`: they count towards raw totals only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageWeights(BTreeMap<String, f64>);

impl Default for StageWeights {
    fn default() -> Self {
        let table = [
            ("FUNDED", 1.0),
            ("READY_FOR_FUNDING", 0.95),
            ("CONDITION_FULFILLMENT", 0.75),
            ("APPROVED", 0.60),
        ];
        Self(table.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

impl StageWeights {
    /// Build a table, rejecting weights outside `[0, 1]` and names that
    /// collide once normalized.
    pub fn new(table: BTreeMap<String, f64>) -> Result<Self, String> {
        let mut normalized = BTreeMap::new();
        for (stage, weight) in table {
            if !(weight.is_finite() && (0.0..=1.0).contains(&weight)) {
                return Err(format!("Invalid weight {weight} for stage `{stage}` (must be in [0, 1])."));
            }
            if normalized.insert(stage_key(&stage), weight).is_some() {
                return Err(format!("Stage `{stage}` is listed more than once."));
            }
        }
        Ok(Self(normalized))
    }

    pub fn weight(&self, stage: &Stage) -> f64 {
        self.0.get(&stage_key(stage.label())).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// A validated input record.
#[derive(Debug, Clone)]
pub struct Observation {
    pub snapshot: DateTime<Utc>,
    pub closing_month: MonthKey,
    pub days_before_close: i64,
    pub raw_amount: f64,
    pub stage: Stage,
    /// `raw_amount × weight(stage)`.
    pub weighted_amount: f64,
}

/// One aggregated point of a month's trajectory (the last snapshot of a calendar day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub snapshot_date: DateTime<Utc>,
    pub days_before_close: i64,
    pub raw_pipeline: f64,
    pub weighted_pipeline: f64,
}

/// Chronological points for one closing month (descending days-before-close).
pub type Trajectory = Vec<DailySnapshot>;

/// Closing month → trajectory.
pub type MonthSeries = BTreeMap<MonthKey, Trajectory>;

/// Closing value of a month: the trajectory point nearest month end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosingValue {
    pub days_before_close: i64,
    pub raw: f64,
    pub weighted: f64,
}

/// Day-indexed empirical daily growth rates.
///
/// All vectors have length [`CURVE_DAYS`]; index `d` is days-before-close `d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthCurve {
    /// Median of the growth values attributed to each day (`0` when none).
    pub median: Vec<f64>,
    /// Moving average of `median` over `[d-2, d+2]`, clamped at the ends.
    pub smoothed: Vec<f64>,
    /// Number of growth values attributed to each day.
    pub samples: Vec<usize>,
}

impl GrowthCurve {
    pub fn flat(rate: f64) -> Self {
        Self {
            median: vec![rate; CURVE_DAYS],
            smoothed: vec![rate; CURVE_DAYS],
            samples: vec![0; CURVE_DAYS],
        }
    }

    /// Smoothed rate for days-before-close `day` (`0` outside the curve).
    pub fn rate(&self, day: i64) -> f64 {
        usize::try_from(day)
            .ok()
            .and_then(|d| self.smoothed.get(d))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Run-wide analysis settings.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Only closing months in this year are analysed.
    pub year: i32,
    /// "Now": months ending before this instant are candidates for history.
    pub as_of: DateTime<Utc>,
    pub stage_weights: StageWeights,
}

impl AnalysisConfig {
    pub fn new(year: i32, as_of: DateTime<Utc>) -> Self {
        Self {
            year,
            as_of,
            stage_weights: StageWeights::default(),
        }
    }

    /// Earliest closing month considered as a similarity analog.
    pub fn similarity_cutoff(&self) -> MonthKey {
        MonthKey { year: self.year, month: 1 }
    }

    /// First closing month that is backtested.
    pub fn backtest_cutoff(&self) -> MonthKey {
        MonthKey { year: self.year, month: 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
    }

    #[test]
    fn month_key_roundtrips_text() {
        let key: MonthKey = "2025-03".parse().unwrap();
        assert_eq!(key, MonthKey::new(2025, 3).unwrap());
        assert_eq!(key.to_string(), "2025-03");
        assert!("2025-13".parse::<MonthKey>().is_err());
    }

    #[test]
    fn month_navigation_wraps_years() {
        let jan = MonthKey::new(2025, 1).unwrap();
        assert_eq!(jan.previous(), MonthKey::new(2024, 12).unwrap());
        assert_eq!(jan.previous().next(), jan);
        assert_eq!(MonthKey::new(2024, 2).unwrap().last_day().day(), 29);
    }

    #[test]
    fn end_instant_is_last_millisecond() {
        let feb = MonthKey::new(2025, 2).unwrap();
        let end = feb.end_instant();
        assert_eq!(end.date_naive(), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
        assert_eq!(end + Duration::milliseconds(1), MonthKey::new(2025, 3).unwrap().start_instant());
    }

    #[test]
    fn days_before_close_boundaries() {
        let month = MonthKey::new(2025, 3).unwrap();
        assert_eq!(days_before_close(month.end_instant(), month), 0);
        assert_eq!(days_before_close(month.end_instant() - Duration::days(1), month), 1);
        // Any time during the last day (before the final instant) rounds up to 1.
        assert_eq!(days_before_close(utc(2025, 3, 31, 0, 0, 0), month), 1);
        assert_eq!(days_before_close(utc(2025, 3, 30, 12, 0, 0), month), 2);
        // After month end the count goes negative.
        assert_eq!(days_before_close(utc(2025, 4, 2, 12, 0, 0), month), -1);
    }

    #[test]
    fn unknown_stage_weighs_zero() {
        let weights = StageWeights::default();
        assert_eq!(weights.weight(&Stage::parse("FUNDED")), 1.0);
        assert_eq!(weights.weight(&Stage::parse(" APPROVED ")), 0.60);
        assert_eq!(weights.weight(&Stage::parse("LEAD")), 0.0);
        assert_eq!(Stage::parse("funded"), Stage::Funded);
    }

    #[test]
    fn custom_stage_names_match_across_case() {
        let mut table = BTreeMap::new();
        table.insert("Pipeline Review".to_string(), 0.5);
        let weights = StageWeights::new(table).unwrap();
        assert_eq!(Stage::parse(" Pipeline Review "), Stage::Other("Pipeline Review".to_string()));
        assert_eq!(weights.weight(&Stage::parse("Pipeline Review")), 0.5);
        assert_eq!(weights.weight(&Stage::parse("PIPELINE REVIEW")), 0.5);

        let mut dupes = BTreeMap::new();
        dupes.insert("funded".to_string(), 1.0);
        dupes.insert("FUNDED".to_string(), 0.9);
        assert!(StageWeights::new(dupes).is_err());
    }

    #[test]
    fn stage_weights_reject_out_of_range() {
        let mut table = BTreeMap::new();
        table.insert("X".to_string(), 1.5);
        assert!(StageWeights::new(table).is_err());
    }

    #[test]
    fn curve_rate_is_zero_outside_range() {
        let curve = GrowthCurve::flat(0.01);
        assert_eq!(curve.rate(0), 0.01);
        assert_eq!(curve.rate(89), 0.01);
        assert_eq!(curve.rate(90), 0.0);
        assert_eq!(curve.rate(-1), 0.0);
    }
}
