//! Per-event analytical stages.
//!
//! Leaf-first:
//!
//! - `preflare`: baseline irradiance level before the flare onset
//! - `peak_match`: remove flare-peak contamination using a reference line
//! - `depth`, `slope`, `duration`: dimming parameters of a fitted curve
//!
//! Every stage is a pure function. A quantity that cannot be determined comes
//! back as `None`; only malformed input is an error.

pub mod depth;
pub mod duration;
pub mod peak_match;
pub mod preflare;
pub mod slope;

pub use depth::*;
pub use duration::*;
pub use peak_match::*;
pub use preflare::*;
pub use slope::*;
