//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - result and sample exports (CSV) (`export`)
//! - curve JSON read/write and stage-weight tables (`curve`)

pub mod curve;
pub mod export;
pub mod ingest;

pub use curve::*;
pub use export::*;
pub use ingest::*;
