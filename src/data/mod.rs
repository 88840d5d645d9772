//! Synthetic data sources.
//!
//! Generated snapshots use the same column layout as real exports, so every
//! subcommand can be exercised without production data.

pub mod sample;

pub use sample::*;
