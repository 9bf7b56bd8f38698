//! Terminal plots of light curves and fits.

pub mod ascii;

pub use ascii::*;
