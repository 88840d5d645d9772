//! Debug bundle writer for auditing forecasts.
//!
//! The bundle is a single markdown file with the run settings, the growth
//! curve and every forecast's day-by-day compounding.

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::analysis::MonthForecast;
use crate::app::pipeline::Dataset;
use crate::error::AppError;

/// Write the bundle into `dir` (created if missing) and return its path.
pub fn write_debug_bundle(dir: &Path, ds: &Dataset, forecasts: &[MonthForecast]) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::internal(format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let as_of = ds.config().as_of.format("%Y%m%d");
    let path = dir.join(format!("pf_debug_{as_of}_{ts}.md"));

    let file = File::create(&path).map_err(|e| AppError::internal(format!("Failed to create debug file: {e}")))?;
    write_bundle(file, ds, forecasts).map_err(|e| AppError::internal(format!("Failed to write debug: {e}")))?;

    Ok(path)
}

fn write_bundle<W: Write>(mut w: W, ds: &Dataset, forecasts: &[MonthForecast]) -> std::io::Result<()> {
    let config = ds.config();
    let ingest = ds.ingest();

    writeln!(w, "# pf debug bundle")?;
    writeln!(w, "- generated: {}", Local::now().to_rfc3339())?;
    writeln!(w, "- year: {}", config.year)?;
    writeln!(w, "- as_of: {}", config.as_of.to_rfc3339())?;
    writeln!(
        w,
        "- rows: read={} used={} dropped={}",
        ingest.rows_read,
        ingest.rows_used(),
        ingest.rows_dropped()
    )?;
    for (reason, count) in ingest.drop_counts() {
        writeln!(w, "  - {}: {count}", reason.describe())?;
    }

    writeln!(w, "\n## Stage weights")?;
    writeln!(w, "| stage | weight |")?;
    writeln!(w, "| - | - |")?;
    for (stage, weight) in config.stage_weights.iter() {
        writeln!(w, "| {stage} | {weight:.2} |")?;
    }

    let classes = ds.classes();
    writeln!(w, "\n## Months")?;
    writeln!(w, "| month | class | points | close_weighted |")?;
    writeln!(w, "| - | - | - | - |")?;
    for (month, trajectory) in ds.series() {
        let class = if classes.is_historical(*month) { "historical" } else { "current" };
        let close = classes
            .closing_value(*month)
            .map(|c| format!("{:.2}", c.weighted))
            .unwrap_or_else(|| "-".to_string());
        writeln!(w, "| {month} | {class} | {} | {close} |", trajectory.len())?;
    }

    let curve = ds.curve();
    writeln!(w, "\n## Growth curve")?;
    writeln!(w, "| day | median | smoothed | samples |")?;
    writeln!(w, "| - | - | - | - |")?;
    for d in (0..curve.smoothed.len()).rev() {
        writeln!(
            w,
            "| {d} | {:.6} | {:.6} | {} |",
            curve.median[d], curve.smoothed[d], curve.samples[d]
        )?;
    }

    for f in forecasts {
        writeln!(w, "\n## Forecast {}", f.month)?;
        writeln!(
            w,
            "- latest: {} raw={:.2} weighted={:.2} days_to_close={}",
            f.latest_snapshot.to_rfc3339(),
            f.raw_pipeline,
            f.weighted_pipeline,
            f.days_to_close
        )?;
        let Some(p) = &f.projection else {
            writeln!(w, "- not recommended: too far from close")?;
            continue;
        };
        writeln!(
            w,
            "- forecast: {:.2} (total growth {:.4}%)",
            p.forecast,
            p.total_projected_growth * 100.0
        )?;
        writeln!(w, "\n| day | date | rate | before | after |")?;
        writeln!(w, "| - | - | - | - | - |")?;
        for s in &p.steps {
            writeln!(
                w,
                "| {} | {} | {:.6} | {:.2} | {:.2} |",
                s.day, s.date, s.rate, s.value_before, s.value_after
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::domain::AnalysisConfig;

    #[test]
    fn bundle_contains_breakdown() {
        let text = "snapshot_date,closing_date,total_amount,stage\n\
                    2025-03-28T12:00:00Z,03/31/2025,1000,FUNDED\n";
        let config = AnalysisConfig::new(2025, Utc.with_ymd_and_hms(2025, 3, 29, 0, 0, 0).unwrap());
        let ds = Dataset::from_csv_text(text, config).unwrap();
        let forecasts = ds.forecasts();

        let dir = tempfile::tempdir().unwrap();
        let path = write_debug_bundle(dir.path(), &ds, &forecasts).unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("## Forecast 2025-03"));
        assert!(body.contains("| FUNDED | 1.00 |"));
        // Four days out: steps for days 3, 2, 1 and 0.
        assert!(body.contains("- latest: 2025-03-28T12:00:00+00:00 raw=1000.00 weighted=1000.00 days_to_close=4"));
        assert!(body.contains("| 0 | 2025-04-01 |"));
    }
}
