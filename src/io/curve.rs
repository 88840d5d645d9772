//! Read/write growth-curve JSON files, and load stage-weight tables.
//!
//! Curve JSON is the portable representation of a trained curve:
//! - run metadata (analysis year, as-of instant, training months)
//! - per-day median and smoothed rates
//! - per-day sample counts

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{GrowthCurve, MonthKey, StageWeights, CURVE_DAYS};
use crate::error::AppError;

/// On-disk curve schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub year: i32,
    pub as_of: DateTime<Utc>,
    pub training_months: Vec<MonthKey>,
    pub curve: GrowthCurve,
}

impl CurveFile {
    pub fn new(year: i32, as_of: DateTime<Utc>, training_months: &[MonthKey], curve: &GrowthCurve) -> Self {
        Self {
            tool: "pf".to_string(),
            year,
            as_of,
            training_months: training_months.to_vec(),
            curve: curve.clone(),
        }
    }
}

/// Write a curve JSON file.
pub fn write_curve_json(path: &Path, curve: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::usage(format!("Failed to create curve JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::internal(format!("Failed to write curve JSON: {e}")))?;
    Ok(())
}

/// Read a curve JSON file, checking that every per-day vector has one slot per day.
pub fn read_curve_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::usage(format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    let curve: CurveFile =
        serde_json::from_reader(file).map_err(|e| AppError::usage(format!("Invalid curve JSON: {e}")))?;

    let c = &curve.curve;
    if c.median.len() != CURVE_DAYS || c.smoothed.len() != CURVE_DAYS || c.samples.len() != CURVE_DAYS {
        return Err(AppError::usage(format!(
            "Invalid curve JSON: expected {CURVE_DAYS} daily slots."
        )));
    }
    Ok(curve)
}

/// Load a stage → weight table from a JSON object such as `{"FUNDED": 1.0}`.
pub fn load_stage_weights(path: &Path) -> Result<StageWeights, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::usage(format!("Failed to open stage weights '{}': {e}", path.display())))?;
    let table: BTreeMap<String, f64> = serde_json::from_reader(file)
        .map_err(|e| AppError::usage(format!("Invalid stage weights JSON: {e}")))?;
    StageWeights::new(table).map_err(AppError::usage)
}
