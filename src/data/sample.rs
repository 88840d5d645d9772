//! Synthetic pipeline snapshot generation.
//!
//! Each closing month gets a book of deals. A deal enters the pipeline some
//! days before month end, climbs through the stages as close approaches and
//! occasionally falls out. One snapshot is taken per day at 18:00 UTC, and an
//! occasional day is skipped entirely to mimic missed exports.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::LogNormal;
use serde::Serialize;

use crate::domain::{days_before_close, MonthKey, MAX_DAYS_BEFORE_CLOSE};
use crate::error::AppError;

/// Median deal size.
const MEDIAN_AMOUNT: f64 = 25_000.0;
const AMOUNT_SIGMA: f64 = 0.6;
const FALLOUT_PROB: f64 = 0.15;
const SKIPPED_DAY_PROB: f64 = 0.05;
/// Snapshots continue this many days past month end.
const POST_CLOSE_DAYS: i64 = 2;

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub year: i32,
    /// Closing months `1..=months` of `year` are generated.
    pub months: u32,
    pub deals_per_month: usize,
    pub seed: u64,
    /// No snapshot is generated after this instant.
    pub as_of: DateTime<Utc>,
}

/// One generated row, serialized with the ingest column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRow {
    pub snapshot_date: String,
    pub closing_date: String,
    pub total_amount: String,
    pub stage: String,
}

#[derive(Debug, Clone)]
struct Deal {
    closing_day: u32,
    amount: f64,
    entry_days: i64,
    fallout_days: Option<i64>,
}

pub fn generate_sample(config: &SampleConfig) -> Result<Vec<SampleRow>, AppError> {
    if !(1..=12).contains(&config.months) {
        return Err(AppError::usage("Sample months must be between 1 and 12."));
    }
    if config.deals_per_month == 0 {
        return Err(AppError::usage("Deals per month must be > 0."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let amounts = LogNormal::new(MEDIAN_AMOUNT.ln(), AMOUNT_SIGMA)
        .map_err(|e| AppError::internal(format!("Amount distribution error: {e}")))?;

    let mut rows = Vec::new();
    for m in 1..=config.months {
        let month = MonthKey::new(config.year, m)
            .ok_or_else(|| AppError::internal(format!("Invalid sample month {m}.")))?;
        let last_day = month.last_day().day();

        let deals: Vec<Deal> = (0..config.deals_per_month)
            .map(|_| {
                let entry_days = rng.gen_range(5..=MAX_DAYS_BEFORE_CLOSE);
                let fallout_days = rng.gen_bool(FALLOUT_PROB).then(|| rng.gen_range(0..entry_days));
                Deal {
                    closing_day: rng.gen_range(1..=last_day),
                    amount: (amounts.sample(&mut rng) * 100.0).round() / 100.0,
                    entry_days,
                    fallout_days,
                }
            })
            .collect();

        let first = month.last_day() - Duration::days(MAX_DAYS_BEFORE_CLOSE - 1);
        let last = month.last_day() + Duration::days(POST_CLOSE_DAYS);
        let mut date = first;
        while date <= last {
            let instant = Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN)));
            if instant > config.as_of {
                break;
            }
            date += Duration::days(1);
            if rng.gen_bool(SKIPPED_DAY_PROB) {
                continue;
            }

            let dbc = days_before_close(instant, month);
            for deal in &deals {
                if dbc > deal.entry_days || deal.fallout_days.is_some_and(|d| dbc <= d) {
                    continue;
                }
                let closing = month.first_day().with_day(deal.closing_day).unwrap_or(month.last_day());
                rows.push(SampleRow {
                    snapshot_date: instant.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                    closing_date: closing.format("%m/%d/%Y").to_string(),
                    total_amount: format_amount(deal.amount),
                    stage: stage_for(dbc, deal.entry_days).to_string(),
                });
            }
        }
    }

    Ok(rows)
}

/// Stage reached after covering `1 - dbc / entry` of the way to close.
fn stage_for(dbc: i64, entry_days: i64) -> &'static str {
    let progress = 1.0 - dbc as f64 / entry_days.max(1) as f64;
    if progress < 0.3 {
        "APPROVED"
    } else if progress < 0.6 {
        "CONDITION_FULFILLMENT"
    } else if progress < 0.85 {
        "READY_FOR_FUNDING"
    } else {
        "FUNDED"
    }
}

/// `12345.6` -> `$12,345.60`.
fn format_amount(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::domain::AnalysisConfig;
    use crate::io::export::write_snapshot_rows;
    use crate::io::ingest::read_observations;

    fn config() -> SampleConfig {
        SampleConfig {
            year: 2025,
            months: 3,
            deals_per_month: 8,
            seed: 7,
            as_of: Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn same_seed_same_rows() {
        assert_eq!(generate_sample(&config()).unwrap(), generate_sample(&config()).unwrap());
    }

    #[test]
    fn rows_pass_ingest_and_stop_at_as_of() {
        let cfg = config();
        let rows = generate_sample(&cfg).unwrap();
        assert!(!rows.is_empty());

        let mut buf = Vec::new();
        write_snapshot_rows(&mut buf, &rows).unwrap();
        let data = read_observations(buf.as_slice(), &AnalysisConfig::new(2025, cfg.as_of)).unwrap();
        assert_eq!(data.rows_dropped(), 0);
        assert_eq!(data.rows_used(), rows.len());
        assert!(data.observations.iter().all(|o| o.snapshot <= cfg.as_of));
    }

    #[test]
    fn rejects_bad_config() {
        let mut cfg = config();
        cfg.months = 0;
        assert_eq!(generate_sample(&cfg).unwrap_err().exit_code(), 2);
        let mut cfg = config();
        cfg.deals_per_month = 0;
        assert!(generate_sample(&cfg).is_err());
    }

    #[test]
    fn amounts_are_grouped() {
        assert_eq!(format_amount(12345.6), "$12,345.60");
        assert_eq!(format_amount(999.0), "$999.00");
        assert_eq!(format_amount(1_000_000.0), "$1,000,000.00");
    }

    #[test]
    fn stages_advance_towards_close() {
        assert_eq!(stage_for(40, 40), "APPROVED");
        assert_eq!(stage_for(20, 40), "CONDITION_FULFILLMENT");
        assert_eq!(stage_for(10, 40), "READY_FOR_FUNDING");
        assert_eq!(stage_for(0, 40), "FUNDED");
        assert_eq!(stage_for(-2, 40), "FUNDED");
    }
}
