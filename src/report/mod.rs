//! Reporting: formatted terminal output for every subcommand.

pub mod format;

pub use format::*;
