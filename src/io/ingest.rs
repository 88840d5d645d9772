//! CSV ingest and record validation.
//!
//! This module turns snapshot-export rows into clean `Observation`s.
//!
//! Design goals:
//! - **Strict schema** for the four required columns (clear errors + exit code 2)
//! - **Row-level validation**: bad rows are dropped, never fatal, and counted by reason
//! - **Deterministic behavior**: every date is interpreted as UTC
//! - **Separation of concerns**: no aggregation or modeling here

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::StringRecord;
use log::{debug, info};

use crate::domain::{
    days_before_close, AnalysisConfig, MonthKey, Observation, Stage, StageWeights, MAX_DAYS_BEFORE_CLOSE,
    MIN_DAYS_BEFORE_CLOSE,
};
use crate::error::AppError;

const SNAPSHOT_COLUMNS: [&str; 4] = ["snapshot_date", "snapshot_timestamp", "snapshot", "timestamp"];
const CLOSING_COLUMNS: [&str; 3] = ["closing_date", "close_date", "closing"];
const AMOUNT_COLUMNS: [&str; 3] = ["total_amount", "amount", "total"];
const STAGE_COLUMNS: [&str; 2] = ["stage", "milestone"];

/// One unvalidated input row. `None` means the cell is missing or blank.
#[derive(Debug, Clone, Default)]
pub struct RawRow<'a> {
    pub snapshot: Option<&'a str>,
    pub closing_date: Option<&'a str>,
    pub amount: Option<&'a str>,
    pub stage: Option<&'a str>,
}

/// Why a row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    /// The CSV reader could not decode the record.
    Malformed,
    MissingField,
    BadSnapshot,
    BadClosingDate,
    WrongYear,
    OutOfRange,
    BadAmount,
}

impl DropReason {
    pub fn describe(self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed record",
            DropReason::MissingField => "missing field",
            DropReason::BadSnapshot => "unparseable snapshot timestamp",
            DropReason::BadClosingDate => "unparseable closing date",
            DropReason::WrongYear => "closing year outside analysis year",
            DropReason::OutOfRange => "days-before-close outside [-5, 89]",
            DropReason::BadAmount => "unparseable or negative amount",
        }
    }
}

/// A dropped row.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub reason: DropReason,
}

/// Ingest output: validated observations plus what was dropped.
#[derive(Debug, Clone, Default)]
pub struct IngestedData {
    pub observations: Vec<Observation>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

impl IngestedData {
    pub fn rows_used(&self) -> usize {
        self.observations.len()
    }

    pub fn rows_dropped(&self) -> usize {
        self.row_errors.len()
    }

    pub fn drop_counts(&self) -> BTreeMap<DropReason, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.row_errors {
            *counts.entry(e.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Load a snapshot CSV from disk.
pub fn load_observations(path: &Path, config: &AnalysisConfig) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::usage(format!("Failed to open CSV '{}': {e}", path.display())))?;
    read_observations(file, config)
}

/// Parse snapshot CSV text (header row required).
///
/// Only a missing required column is an error; individual bad rows are dropped.
pub fn read_observations<R: Read>(reader: R, config: &AnalysisConfig) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::usage(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let columns = Columns::resolve(&build_header_map(&headers))?;

    let mut data = IngestedData::default();

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header, and lines are 1-based.
        let line = idx + 2;
        data.rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!("line {line}: CSV decode error: {e}");
                data.row_errors.push(RowError {
                    line,
                    reason: DropReason::Malformed,
                });
                continue;
            }
        };

        let row = columns.row(&record);
        match parse_record(&row, config.year, &config.stage_weights) {
            Ok(obs) => data.observations.push(obs),
            Err(reason) => data.row_errors.push(RowError { line, reason }),
        }
    }

    info!(
        "ingest: rows_read={} rows_used={} rows_dropped={}",
        data.rows_read,
        data.rows_used(),
        data.rows_dropped()
    );
    Ok(data)
}

/// Validate one row.
///
/// Checks run in a fixed order and the first failure decides the drop reason:
/// fields present, snapshot, closing date, analysis year, days-before-close
/// range, amount. The stage never fails; unknown stages weigh `0`.
pub fn parse_record(row: &RawRow<'_>, year: i32, weights: &StageWeights) -> Result<Observation, DropReason> {
    let (Some(snapshot), Some(closing), Some(amount), Some(stage)) =
        (non_blank(row.snapshot), non_blank(row.closing_date), non_blank(row.amount), non_blank(row.stage))
    else {
        return Err(DropReason::MissingField);
    };

    let snapshot = parse_snapshot(snapshot).ok_or(DropReason::BadSnapshot)?;
    let closing_date = parse_closing_date(closing).ok_or(DropReason::BadClosingDate)?;
    let closing_month = MonthKey::from_date(closing_date);
    if closing_month.year() != year {
        return Err(DropReason::WrongYear);
    }

    let days = days_before_close(snapshot, closing_month);
    if !(MIN_DAYS_BEFORE_CLOSE..=MAX_DAYS_BEFORE_CLOSE).contains(&days) {
        return Err(DropReason::OutOfRange);
    }

    let raw_amount = parse_amount(amount).ok_or(DropReason::BadAmount)?;
    let stage = Stage::parse(stage);
    let weighted_amount = raw_amount * weights.weight(&stage);

    Ok(Observation {
        snapshot,
        closing_month,
        days_before_close: days,
        raw_amount,
        stage,
        weighted_amount,
    })
}

/// Parse a snapshot timestamp as a UTC instant.
///
/// Offsets in RFC 3339 text are honoured; naive timestamps and bare dates are UTC.
pub fn parse_snapshot(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATETIME_FMTS: [&str; 8] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%m/%d/%Y %H:%M:%S%.f",
        "%m/%d/%Y %H:%M",
        "%m/%d/%Y %I:%M:%S %p",
        "%m/%d/%Y %I:%M %p",
    ];
    for fmt in DATETIME_FMTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let date = parse_closing_date(s)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Parse a closing date: `MM/DD/YYYY` or ISO `YYYY-MM-DD`.
pub fn parse_closing_date(s: &str) -> Option<NaiveDate> {
    const FMTS: [&str; 2] = ["%m/%d/%Y", "%Y-%m-%d"];
    FMTS.iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s.trim(), fmt).ok())
}

/// Parse a currency amount such as `$1,250.50`. Negative or non-finite values are rejected.
pub fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != '$' && *c != ',').collect();
    let v = cleaned.trim().parse::<f64>().ok()?;
    if v.is_finite() && v >= 0.0 { Some(v) } else { None }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Indices of the four required columns.
#[derive(Debug, Clone, Copy)]
struct Columns {
    snapshot: usize,
    closing_date: usize,
    amount: usize,
    stage: usize,
}

impl Columns {
    fn resolve(header_map: &HashMap<String, usize>) -> Result<Self, AppError> {
        Ok(Self {
            snapshot: find_column(header_map, &SNAPSHOT_COLUMNS)?,
            closing_date: find_column(header_map, &CLOSING_COLUMNS)?,
            amount: find_column(header_map, &AMOUNT_COLUMNS)?,
            stage: find_column(header_map, &STAGE_COLUMNS)?,
        })
    }

    fn row<'a>(&self, record: &'a StringRecord) -> RawRow<'a> {
        RawRow {
            snapshot: record.get(self.snapshot),
            closing_date: record.get(self.closing_date),
            amount: record.get(self.amount),
            stage: record.get(self.stage),
        }
    }
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Result<usize, AppError> {
    names
        .iter()
        .find_map(|name| header_map.get(*name).copied())
        .ok_or_else(|| AppError::usage(format!("Missing required column: `{}`", names[0])))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, name) in headers.iter().enumerate() {
        // First occurrence wins for duplicated headers.
        map.entry(normalize_header_name(name)).or_insert(idx);
    }
    map
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<'a>(snapshot: &'a str, closing: &'a str, amount: &'a str, stage: &'a str) -> RawRow<'a> {
        RawRow {
            snapshot: Some(snapshot),
            closing_date: Some(closing),
            amount: Some(amount),
            stage: Some(stage),
        }
    }

    fn parse(r: &RawRow<'_>) -> Result<Observation, DropReason> {
        parse_record(r, 2025, &StageWeights::default())
    }

    #[test]
    fn weighted_amount_uses_stage_weight() {
        let obs = parse(&row("2025-03-10T12:00:00Z", "03/31/2025", "$1,000.00", "CONDITION_FULFILLMENT")).unwrap();
        assert_eq!(obs.raw_amount, 1000.0);
        assert!((obs.weighted_amount - 750.0).abs() < 1e-9);
        assert_eq!(obs.closing_month, MonthKey::new(2025, 3).unwrap());
    }

    #[test]
    fn unknown_stage_contributes_raw_only() {
        let obs = parse(&row("2025-03-10", "2025-03-15", "500", "PROSPECT")).unwrap();
        assert_eq!(obs.raw_amount, 500.0);
        assert_eq!(obs.weighted_amount, 0.0);
    }

    #[test]
    fn snapshot_at_month_end_is_day_zero() {
        let obs = parse(&row("2025-03-31T23:59:59.999Z", "03/31/2025", "1", "FUNDED")).unwrap();
        assert_eq!(obs.days_before_close, 0);
        let obs = parse(&row("2025-03-30T23:59:59.999Z", "03/31/2025", "1", "FUNDED")).unwrap();
        assert_eq!(obs.days_before_close, 1);
    }

    #[test]
    fn range_boundary_89_kept_90_dropped() {
        // April 2025 ends 2025-04-30T23:59:59.999Z.
        let kept = parse(&row("2025-01-31T23:59:59.999Z", "2025-04-30", "1", "FUNDED")).unwrap();
        assert_eq!(kept.days_before_close, 89);
        let dropped = parse(&row("2025-01-30T23:59:59.999Z", "2025-04-30", "1", "FUNDED"));
        assert_eq!(dropped.unwrap_err(), DropReason::OutOfRange);
    }

    #[test]
    fn far_out_snapshot_is_dropped() {
        // 94 days before the end of June.
        let r = parse(&row("2025-03-28T12:00:00Z", "06/30/2025", "1", "FUNDED"));
        assert_eq!(r.unwrap_err(), DropReason::OutOfRange);
    }

    #[test]
    fn drop_reasons_follow_validation_order() {
        let missing = RawRow {
            snapshot: Some("2025-03-01"),
            closing_date: None,
            amount: Some("1"),
            stage: Some("FUNDED"),
        };
        assert_eq!(parse(&missing).unwrap_err(), DropReason::MissingField);
        assert_eq!(parse(&row("  ", "2025-03-01", "1", "X")).unwrap_err(), DropReason::MissingField);
        assert_eq!(parse(&row("yesterday", "2025-03-31", "1", "X")).unwrap_err(), DropReason::BadSnapshot);
        assert_eq!(parse(&row("2025-03-01", "31.03.2025", "1", "X")).unwrap_err(), DropReason::BadClosingDate);
        assert_eq!(parse(&row("2024-12-01", "2024-12-31", "1", "X")).unwrap_err(), DropReason::WrongYear);
        assert_eq!(parse(&row("2025-03-01", "2025-03-31", "n/a", "X")).unwrap_err(), DropReason::BadAmount);
        assert_eq!(parse(&row("2025-03-01", "2025-03-31", "-5", "X")).unwrap_err(), DropReason::BadAmount);
    }

    #[test]
    fn snapshot_formats_are_utc() {
        let a = parse_snapshot("2025-03-10 08:30:00").unwrap();
        let b = parse_snapshot("03/10/2025 08:30").unwrap();
        let c = parse_snapshot("2025-03-10T10:30:00+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn csv_with_bom_and_spaced_headers() {
        let text = "\u{feff}Snapshot Date,Closing Date,Total Amount,Stage\n\
                    2025-03-10T12:00:00Z,03/31/2025,\"$2,000\",FUNDED\n\
                    2025-03-10T12:00:00Z,03/31/2025,oops,FUNDED\n\
                    2025-03-10T12:00:00Z,,100,FUNDED\n";
        let config = AnalysisConfig::new(2025, Utc::now());
        let data = read_observations(text.as_bytes(), &config).unwrap();
        assert_eq!(data.rows_read, 3);
        assert_eq!(data.rows_used(), 1);
        assert_eq!(data.observations[0].raw_amount, 2000.0);
        let counts = data.drop_counts();
        assert_eq!(counts.get(&DropReason::BadAmount), Some(&1));
        assert_eq!(counts.get(&DropReason::MissingField), Some(&1));
    }

    #[test]
    fn missing_column_is_a_usage_error() {
        let text = "snapshot_date,closing_date,stage\n2025-03-10,2025-03-31,FUNDED\n";
        let config = AnalysisConfig::new(2025, Utc::now());
        let err = read_observations(text.as_bytes(), &config).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
