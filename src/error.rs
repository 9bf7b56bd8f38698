//! Application error type.
//!
//! Only *hard* failures travel through `AppError`: bad configuration, unreadable
//! files, malformed light curves. A quantity that simply cannot be determined
//! (no dip, fit rejected, thresholds exceeded) is an `Option::None` on the
//! result, never an error.

use thiserror::Error;

/// Exit code for configuration and I/O problems.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for malformed input data (empty curves, unordered timestamps, ...).
pub const EXIT_MALFORMED: u8 = 3;
/// Exit code for numerical failures that cannot be degraded to "undetermined".
pub const EXIT_NUMERICAL: u8 = 4;

#[derive(Clone, Error)]
#[error("{message}")]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(EXIT_MALFORMED, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}
