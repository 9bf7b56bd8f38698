//! Input/output helpers.
//!
//! - archive and flare list CSV ingest (`ingest`)
//! - catalog exports, CSV and JSON lines (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
