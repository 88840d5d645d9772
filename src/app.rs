//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments (with `.env` defaults)
//! - loads the snapshot CSV into a `Dataset`
//! - runs the requested analysis
//! - prints reports and writes optional exports

use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Parser;
use log::info;

use crate::analysis::summarize_backtest;
use crate::cli::{BacktestArgs, Command, CurveArgs, DataArgs, ForecastArgs, GoalSeekArgs, SampleArgs, SimilarArgs};
use crate::data::{generate_sample, SampleConfig};
use crate::domain::AnalysisConfig;
use crate::error::AppError;
use crate::io::{load_stage_weights, write_backtest_csv, write_curve_json, write_snapshot_csv, CurveFile};
use crate::report;

pub mod pipeline;

use pipeline::Dataset;

/// Entry point for the `pf` binary.
pub fn run() -> Result<(), AppError> {
    // A missing .env is fine; flags and the real environment still apply.
    let _ = dotenvy::dotenv();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Forecast(args) => handle_forecast(args),
        Command::Curve(args) => handle_curve(args),
        Command::Backtest(args) => handle_backtest(args),
        Command::Peaks(args) => handle_peaks(args),
        Command::Similar(args) => handle_similar(args),
        Command::GoalSeek(args) => handle_goal_seek(args),
        Command::Sample(args) => handle_sample(args),
    }
}

fn handle_forecast(args: ForecastArgs) -> Result<(), AppError> {
    let ds = load_dataset(&args.data)?;
    let forecasts = ds.forecasts();

    println!("{}", report::format_run_summary(&ds));
    println!("{}", report::format_forecasts(&forecasts, args.breakdown));

    if args.debug {
        let path = crate::debug::write_debug_bundle(Path::new("debug"), &ds, &forecasts)?;
        println!("Debug bundle: {}", path.display());
    }
    Ok(())
}

fn handle_curve(args: CurveArgs) -> Result<(), AppError> {
    let ds = load_dataset(&args.data)?;
    if ds.classes().historical.is_empty() {
        return Err(AppError::insufficient("No historical months to learn a growth curve from."));
    }

    println!("{}", report::format_run_summary(&ds));
    println!("{}", report::format_curve(ds.curve()));

    if let Some(path) = &args.export_curve {
        let config = ds.config();
        let file = CurveFile::new(config.year, config.as_of, &ds.classes().historical, ds.curve());
        write_curve_json(path, &file)?;
        info!("curve written to {}", path.display());
    }
    Ok(())
}

fn handle_backtest(args: BacktestArgs) -> Result<(), AppError> {
    let ds = load_dataset(&args.data)?;
    let results = ds.backtest();
    let summary = summarize_backtest(&results);

    println!("{}", report::format_run_summary(&ds));
    println!("{}", report::format_backtest(&results, &summary));

    if let Some(path) = &args.export {
        write_backtest_csv(path, &results)?;
        info!("backtest written to {}", path.display());
    }
    Ok(())
}

fn handle_peaks(args: DataArgs) -> Result<(), AppError> {
    let ds = load_dataset(&args)?;
    println!("{}", report::format_run_summary(&ds));
    println!("{}", report::format_peaks(&ds.peaks()));
    Ok(())
}

fn handle_similar(args: SimilarArgs) -> Result<(), AppError> {
    let ds = load_dataset(&args.data)?;
    if ds.trajectory(args.month).is_none() {
        return Err(AppError::insufficient(format!("No snapshots for {}.", args.month)));
    }
    println!("{}", report::format_run_summary(&ds));
    println!("{}", report::format_similar(args.month, &ds.similar_months(args.month)));
    Ok(())
}

fn handle_goal_seek(args: GoalSeekArgs) -> Result<(), AppError> {
    if !(args.goal.is_finite() && args.goal > 0.0) {
        return Err(AppError::usage("Goal must be a positive number."));
    }
    let ds = load_dataset(&args.data)?;
    let result = ds
        .goal_seek(args.month, args.goal)
        .ok_or_else(|| AppError::insufficient(format!("No snapshots for {}.", args.month)))?;
    let analogs = ds.goal_seek_analogs(args.goal, &result);

    println!("{}", report::format_run_summary(&ds));
    println!("{}", report::format_goal_seek(args.month, &result, &analogs));

    if args.trajectory_analogs && result.plan.is_some() {
        let similar = ds.similar_to_trajectory(&result.trajectory, args.goal, Some(args.month));
        println!("{}", report::format_similar(args.month, &similar));
    }
    Ok(())
}

fn handle_sample(args: SampleArgs) -> Result<(), AppError> {
    let as_of = match args.as_of {
        Some(date) => utc_midnight(date),
        None => Utc::now(),
    };
    let config = SampleConfig {
        year: args.year,
        months: args.months,
        deals_per_month: args.deals,
        seed: args.seed,
        as_of,
    };
    let rows = generate_sample(&config)?;
    write_snapshot_csv(&args.out, &rows)?;
    println!("Wrote {} rows to {}", rows.len(), args.out.display());
    Ok(())
}

/// Build the run settings from shared flags.
pub fn analysis_config_from_args(args: &DataArgs) -> Result<AnalysisConfig, AppError> {
    let as_of = match args.as_of {
        Some(date) => utc_midnight(date),
        None => Utc::now(),
    };
    let year = args.year.unwrap_or(as_of.year());

    let mut config = AnalysisConfig::new(year, as_of);
    if let Some(path) = &args.stage_weights {
        config.stage_weights = load_stage_weights(path)?;
    }
    Ok(config)
}

fn load_dataset(args: &DataArgs) -> Result<Dataset, AppError> {
    let config = analysis_config_from_args(args)?;
    let ds = Dataset::from_csv_path(&args.csv, config)?;
    if ds.is_empty() {
        return Err(AppError::insufficient(format!(
            "No usable rows in '{}' for {}.",
            args.csv.display(),
            ds.config().year
        )));
    }
    Ok(ds)
}

fn utc_midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}
