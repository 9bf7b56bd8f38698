//! Mathematical utilities: least squares, statistics, finite differences.

pub mod gradient;
pub mod ols;
pub mod stats;

pub use gradient::*;
pub use ols::*;
pub use stats::*;
