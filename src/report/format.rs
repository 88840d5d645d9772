//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the analysis code stays clean and testable
//! - output changes are localized

use crate::analysis::{
    BacktestResult, CheckpointAccuracy, GoalSeekAnalog, GoalSeekResult, MonthForecast, PeakDecline, SimilarMonth,
};
use crate::app::pipeline::Dataset;
use crate::domain::{GrowthCurve, MonthKey};

/// Dataset header: input stats, drop reasons, month classification.
pub fn format_run_summary(ds: &Dataset) -> String {
    let mut out = String::new();
    let ingest = ds.ingest();
    let config = ds.config();

    out.push_str("=== pf - Pipeline Forecast ===\n");
    out.push_str(&format!("Year: {}\n", config.year));
    out.push_str(&format!("As-of: {}\n", config.as_of.format("%Y-%m-%d %H:%M UTC")));
    out.push_str(&format!(
        "Rows: read={} | used={} | dropped={}\n",
        ingest.rows_read,
        ingest.rows_used(),
        ingest.rows_dropped()
    ));
    for (reason, count) in ingest.drop_counts() {
        out.push_str(&format!("  - {count} {}\n", reason.describe()));
    }

    let classes = ds.classes();
    out.push_str(&format!("Historical months: {}\n", fmt_months(&classes.historical)));
    out.push_str(&format!("Current months: {}\n", fmt_months(&classes.current)));
    out.push('\n');

    out
}

/// Forecast table, optionally followed by each month's daily compounding.
pub fn format_forecasts(forecasts: &[MonthForecast], breakdown: bool) -> String {
    let mut out = String::new();
    if forecasts.is_empty() {
        out.push_str("No open months to forecast.\n");
        return out;
    }

    out.push_str("Month-end forecasts (weighted):\n");
    push_row(
        &mut out,
        format!(
            "{:<8} {:<10} {:>6} {:>16} {:>16} {:>16} {:>9}",
            "month", "latest", "days", "raw", "weighted", "forecast", "growth"
        ),
    );
    push_rule(&mut out, &[8, 10, 6, 16, 16, 16, 9]);

    for f in forecasts {
        let (forecast, growth) = match &f.projection {
            Some(p) => (fmt_money(p.forecast), format!("{:+.2}%", p.total_projected_growth * 100.0)),
            None => ("not recommended".to_string(), "-".to_string()),
        };
        push_row(
            &mut out,
            format!(
                "{:<8} {:<10} {:>6} {:>16} {:>16} {:>16} {:>9}",
                f.month.to_string(),
                f.latest_snapshot.format("%Y-%m-%d").to_string(),
                f.days_to_close,
                fmt_money(f.raw_pipeline),
                fmt_money(f.weighted_pipeline),
                forecast,
                growth
            ),
        );
    }

    if breakdown {
        for f in forecasts {
            let Some(p) = &f.projection else {
                continue;
            };
            out.push_str(&format!("\n{} daily breakdown:\n", f.month));
            push_row(
                &mut out,
                format!("{:>4} {:<10} {:>9} {:>16} {:>16}", "day", "date", "rate", "before", "after"),
            );
            push_rule(&mut out, &[4, 10, 9, 16, 16]);
            for s in &p.steps {
                push_row(
                    &mut out,
                    format!(
                        "{:>4} {:<10} {:>8.4}% {:>16} {:>16}",
                        s.day,
                        s.date.to_string(),
                        s.rate * 100.0,
                        fmt_money(s.value_before),
                        fmt_money(s.value_after)
                    ),
                );
            }
        }
    }

    out
}

/// Growth curve by days-before-close, with the training sample behind each slot.
pub fn format_curve(curve: &GrowthCurve) -> String {
    let mut out = String::new();
    out.push_str("Daily growth curve (days before close):\n");
    push_row(&mut out, format!("{:>4} {:>10} {:>10} {:>8}", "day", "median", "smoothed", "samples"));
    push_rule(&mut out, &[4, 10, 10, 8]);
    for (d, ((m, s), n)) in curve
        .median
        .iter()
        .zip(&curve.smoothed)
        .zip(&curve.samples)
        .enumerate()
        .rev()
    {
        push_row(
            &mut out,
            format!("{:>4} {:>9.4}% {:>9.4}% {:>8}", d, m * 100.0, s * 100.0, n),
        );
    }
    let total: usize = curve.samples.iter().sum();
    let empty = curve.samples.iter().filter(|n| **n == 0).count();
    out.push_str(&format!("Growth samples: {total} | days without samples: {empty}\n"));
    out
}

/// Backtest predictions followed by per-checkpoint accuracy.
pub fn format_backtest(results: &[BacktestResult], summary: &[CheckpointAccuracy]) -> String {
    let mut out = String::new();
    if results.is_empty() {
        out.push_str("No months eligible for backtest.\n");
        return out;
    }

    out.push_str("Backtest predictions:\n");
    push_row(
        &mut out,
        format!(
            "{:<8} {:>5} {:>5} {:>16} {:>16} {:>9}",
            "month", "chk", "days", "prediction", "actual", "error"
        ),
    );
    push_rule(&mut out, &[8, 5, 5, 16, 16, 9]);
    for r in results {
        push_row(
            &mut out,
            format!(
                "{:<8} {:>5} {:>5} {:>16} {:>16} {:>9}",
                r.month.to_string(),
                r.checkpoint,
                r.days_before,
                fmt_money(r.prediction),
                fmt_money(r.actual),
                fmt_pct(r.error_pct())
            ),
        );
    }

    out.push_str("\nAccuracy by checkpoint:\n");
    push_row(&mut out, format!("{:>5} {:>5} {:>9} {:>9}", "chk", "n", "mape", "bias"));
    push_rule(&mut out, &[5, 5, 9, 9]);
    for s in summary {
        push_row(
            &mut out,
            format!("{:>5} {:>5} {:>8.2}% {:>+8.2}%", s.checkpoint, s.count, s.mape, s.bias_pct),
        );
    }

    out
}

pub fn format_peaks(peaks: &[PeakDecline]) -> String {
    let mut out = String::new();
    if peaks.is_empty() {
        out.push_str("No historical months with a peak.\n");
        return out;
    }

    out.push_str("Peak and decline to close:\n");
    push_row(
        &mut out,
        format!(
            "{:<8} {:<16} {:>5} {:>16} {:>16} {:>16} {:>16} {:>9} {:>9}",
            "month", "peak_at", "days", "peak_raw", "peak_wtd", "close_raw", "close_wtd", "raw_dec", "wtd_dec"
        ),
    );
    push_rule(&mut out, &[8, 16, 5, 16, 16, 16, 16, 9, 9]);
    for p in peaks {
        push_row(
            &mut out,
            format!(
                "{:<8} {:<16} {:>5} {:>16} {:>16} {:>16} {:>16} {:>8.2}% {:>8.2}%",
                p.month.to_string(),
                p.peak_snapshot.format("%Y-%m-%d %H:%M").to_string(),
                p.days_before_closing,
                fmt_money(p.peak_raw),
                fmt_money(p.peak_weighted),
                fmt_money(p.actual_raw),
                fmt_money(p.actual_weighted),
                p.raw_decline_pct,
                p.weighted_decline_pct
            ),
        );
    }
    out
}

pub fn format_similar(month: MonthKey, similar: &[SimilarMonth]) -> String {
    let mut out = String::new();
    if similar.is_empty() {
        out.push_str(&format!("No comparable historical months for {month}.\n"));
        return out;
    }

    out.push_str(&format!("Most similar months to {month} (lower score is closer):\n"));
    for (rank, s) in similar.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} score={:.3} trajectory={:.3} closing={:.3} actual_close={}\n",
            rank + 1,
            s.month,
            s.score,
            s.trajectory_distance,
            s.closing_distance,
            fmt_money(s.actual_close)
        ));
        for c in &s.checkpoints {
            out.push_str(&format!(
                "   chk {:>2}: target {} (d{}) vs {} (d{}) {:+.2}%\n",
                c.checkpoint,
                fmt_money(c.target_value),
                c.target_days,
                fmt_money(c.candidate_value),
                c.candidate_days,
                c.pct_diff
            ));
        }
    }
    out
}

pub fn format_goal_seek(month: MonthKey, result: &GoalSeekResult, analogs: &[GoalSeekAnalog]) -> String {
    let mut out = String::new();
    let Some(plan) = &result.plan else {
        out.push_str(&format!(
            "Goal-seek not possible for {month}: needs a positive latest value and days left before close.\n"
        ));
        return out;
    };

    out.push_str(&format!("Goal-seek for {month}:\n"));
    out.push_str(&format!("- goal: {}\n", fmt_money(plan.goal)));
    out.push_str(&format!(
        "- starting value: {} ({} days to close)\n",
        fmt_money(plan.starting_value),
        plan.days_to_close
    ));
    out.push_str(&format!("- base forecast: {}\n", fmt_money(plan.base_forecast)));
    out.push_str(&format!(
        "- required lift: {:+.2}% overall, {:+.4}% per day\n",
        (plan.required_total_growth - 1.0) * 100.0,
        plan.required_daily_lift * 100.0
    ));

    out.push_str("\nProjected path:\n");
    push_row(&mut out, format!("{:<10} {:>5} {:>16} {:>16}", "date", "days", "raw", "weighted"));
    push_rule(&mut out, &[10, 5, 16, 16]);
    let projected = result.trajectory.len().saturating_sub(plan.days_to_close as usize);
    for p in &result.trajectory[projected..] {
        push_row(
            &mut out,
            format!(
                "{:<10} {:>5} {:>16} {:>16}",
                p.snapshot_date.format("%Y-%m-%d").to_string(),
                p.days_before_close,
                fmt_money(p.raw_pipeline),
                fmt_money(p.weighted_pipeline)
            ),
        );
    }

    if !analogs.is_empty() {
        out.push_str("\nHistorical months closest to this goal:\n");
        for (rank, a) in analogs.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} score={:.3} close={} peak={} at d{}\n",
                rank + 1,
                a.month,
                a.score,
                fmt_money(a.actual_close),
                fmt_money(a.peak_value),
                a.days_at_peak
            ));
        }
    }
    out
}

/// `1234567.891` -> `1,234,567.89` (sign preserved).
pub fn fmt_money(v: f64) -> String {
    if !v.is_finite() {
        return "-".to_string();
    }
    let cents = (v.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}{grouped}.{:02}", cents % 100)
}

fn fmt_pct(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:+.2}%"),
        None => "-".to_string(),
    }
}

fn fmt_months(months: &[MonthKey]) -> String {
    if months.is_empty() {
        return "(none)".to_string();
    }
    let parts: Vec<String> = months.iter().map(MonthKey::to_string).collect();
    parts.join(", ")
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn push_rule(out: &mut String, widths: &[usize]) {
    let parts: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(out, parts.join(" "));
}
