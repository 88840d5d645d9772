//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - calendar helpers (`MonthKey`, `days_before_close`)
//! - parsed records (`Observation`, `Stage`, `StageWeights`)
//! - aggregated series (`DailySnapshot`, `MonthSeries`, `ClosingValue`)
//! - learned model output (`GrowthCurve`) and run settings (`AnalysisConfig`)

pub mod types;

pub use types::*;
