//! Automatic curve fitting.
//!
//! Responsibilities:
//!
//! - expand hyperparameter grids from configuration
//! - evaluate each grid value by k-fold validation (parallel)
//! - select the best value, refit, and gate the result on a minimum score

pub mod fitter;
pub mod grid;
pub mod validation;

pub use fitter::*;
pub use grid::*;
pub use validation::*;
