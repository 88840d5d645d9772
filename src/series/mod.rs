//! Month series construction: daily aggregation and month classification.

pub mod aggregate;
pub mod classify;

pub use aggregate::*;
pub use classify::*;
