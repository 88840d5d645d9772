//! Command-line parsing for the pipeline forecaster.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the analysis code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::MonthKey;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pf", version, about = "Month-end pipeline forecaster")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Forecast month-end weighted pipeline for every open month.
    Forecast(ForecastArgs),
    /// Print the learned daily growth curve and optionally export it.
    Curve(CurveArgs),
    /// Walk-forward backtest of the growth model over historical months.
    Backtest(BacktestArgs),
    /// Peak pipeline and decline-to-close for historical months.
    Peaks(DataArgs),
    /// Find the historical months most similar to a given month.
    Similar(SimilarArgs),
    /// Re-project a month so that it closes at a chosen goal.
    GoalSeek(GoalSeekArgs),
    /// Write a synthetic snapshot CSV.
    Sample(SampleArgs),
}

/// Input options shared by every analysis command.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// Snapshot CSV (snapshot_date, closing_date, total_amount, stage).
    #[arg(long, env = "PF_CSV", value_name = "CSV")]
    pub csv: PathBuf,

    /// Analysis year; rows closing in other years are dropped. Defaults to the as-of year.
    #[arg(long, env = "PF_YEAR")]
    pub year: Option<i32>,

    /// Treat this date (UTC midnight) as "now". Defaults to the current time.
    #[arg(long = "as-of", value_name = "YYYY-MM-DD")]
    pub as_of: Option<NaiveDate>,

    /// JSON object of stage -> weight overriding the built-in table.
    #[arg(long = "stage-weights", value_name = "JSON")]
    pub stage_weights: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Print the day-by-day compounding for each month.
    #[arg(long)]
    pub breakdown: bool,

    /// Write a markdown debug bundle under `debug/`.
    #[arg(long)]
    pub debug: bool,
}

#[derive(Debug, Args, Clone)]
pub struct CurveArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Export the curve (rates + sample counts + metadata) to JSON.
    #[arg(long = "export-curve", value_name = "JSON")]
    pub export_curve: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Export per-checkpoint predictions to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimilarArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Target month (YYYY-MM).
    #[arg(long)]
    pub month: MonthKey,
}

#[derive(Debug, Args, Clone)]
pub struct GoalSeekArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Month to re-project (YYYY-MM).
    #[arg(long)]
    pub month: MonthKey,

    /// Target month-end weighted pipeline.
    #[arg(long)]
    pub goal: f64,

    /// Also list historical months whose trajectories resemble the goal-seek path.
    #[arg(long)]
    pub trajectory_analogs: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SampleArgs {
    /// Output CSV path.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    /// Year of the generated closing months.
    #[arg(long, default_value_t = 2025)]
    pub year: i32,

    /// Generate closing months 1..=N.
    #[arg(long, default_value_t = 12)]
    pub months: u32,

    /// Deals per closing month.
    #[arg(long, default_value_t = 40)]
    pub deals: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Stop generating snapshots after this date (UTC midnight).
    #[arg(long = "as-of", value_name = "YYYY-MM-DD")]
    pub as_of: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_goal_seek() {
        let cli = Cli::try_parse_from([
            "pf", "goal-seek", "--csv", "x.csv", "--year", "2025", "--month", "2025-06", "--goal", "1500000",
        ])
        .unwrap();
        match cli.command {
            Command::GoalSeek(args) => {
                assert_eq!(args.month, MonthKey::new(2025, 6).unwrap());
                assert_eq!(args.goal, 1_500_000.0);
                assert_eq!(args.data.year, Some(2025));
                assert!(!args.trajectory_analogs);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_month() {
        let res = Cli::try_parse_from(["pf", "similar", "--csv", "x.csv", "--month", "2025-13"]);
        assert!(res.is_err());
    }

    #[test]
    fn parses_as_of_date() {
        let cli = Cli::try_parse_from(["pf", "peaks", "--csv", "x.csv", "--as-of", "2025-03-15"]).unwrap();
        let Command::Peaks(args) = cli.command else {
            panic!("expected peaks");
        };
        assert_eq!(args.as_of, NaiveDate::from_ymd_opt(2025, 3, 15));
    }
}
