//! Analyses built on the month series and growth curve.
//!
//! - month-end forecasts for open months (`forecast`)
//! - historical analog search (`similarity`)
//! - peak and decline-to-close (`peaks`)
//! - walk-forward backtest (`backtest`)
//! - goal-seek trajectories and analogs (`goal_seek`)
//!
//! Every function here is a pure function of already-built aggregates.

pub mod backtest;
pub mod forecast;
pub mod goal_seek;
pub mod peaks;
pub mod similarity;

pub use backtest::*;
pub use forecast::*;
pub use goal_seek::*;
pub use peaks::*;
pub use similarity::*;
