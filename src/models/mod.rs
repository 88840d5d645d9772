//! Growth-rate model and projection helpers.
//!
//! Models are small, pure functions of their training months so every caller
//! (forecast, backtest, goal-seek) trains and projects the same way.

pub mod growth;

pub use growth::*;
