//! Data sources that are not the real archive.

pub mod sample;

pub use sample::{SynthConfig, SyntheticData, generate, write_csv};
