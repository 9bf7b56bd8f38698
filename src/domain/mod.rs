//! Domain types used throughout the pipeline.
//!
//! - light curves, time windows and flare events (`types`)
//! - per-event outputs and stage summaries (`record`)

pub mod record;
pub mod types;

pub use record::*;
pub use types::*;
