//! Mathematical utilities: medians, moments and curve smoothing.

pub mod stats;

pub use stats::*;
