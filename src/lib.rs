//! `jedi-catalog` library crate.
//!
//! The binary (`jedi`) is a thin wrapper around this library so that:
//!
//! - every stage is testable without spawning processes
//! - the per-event chain can be driven from other front-ends
//!
//! Stage chain per flare and ordered line pair: pre-flare level
//! ([`dimming::preflare`]) -> peak-match subtraction ([`dimming::peak_match`])
//! -> automatic fit ([`fit`]) -> depth, slope and duration ([`dimming`]).

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod dimming;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod report;
