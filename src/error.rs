//! Engine errors
//!
//! Configuration and declaration errors. Test failures are never errors; they
//! are captured into a [`crate::models::TestResult`].

use thiserror::Error;

/// Fatal configuration and declaration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    #[error("Unsupported test order '{0}' (expected 'default' or 'random')")]
    UnsupportedOrder(String),

    #[error("Unknown lifecycle event '{0}' (expected 'before' or 'after')")]
    UnknownEvent(String),

    #[error("Invalid value '{value}' for {name}")]
    InvalidEnv { name: String, value: String },

    #[error("Timeout must be greater than zero")]
    InvalidTimeout,

    #[error("'{0}' must be called inside a suite declaration")]
    NoAmbientSuite(&'static str),

    #[error("Test suite {0} has already been run")]
    SuiteAlreadyRun(u64),
}

pub type Result<T> = std::result::Result<T, SettleError>;
