//! Typed errors raised inside interpreters.
//!
//! Everything here is converted to a failed [`crate::model::CaseResult`]
//! at the `execute` boundary; nothing escapes to the scheduler.

use thiserror::Error;

/// Failure of one UI step. The variant order mirrors the order things can
/// go wrong: dispatch, element resolution, the action itself.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("step requires a locator")]
    MissingLocator,

    #[error("element not visible within {timeout}s: {locator}")]
    ElementTimeout { locator: String, timeout: u64 },

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("invalid wait duration: {0}")]
    InvalidWait(f64),

    #[error(transparent)]
    WebDriver(#[from] thirtyfour::error::WebDriverError),
}

/// Fatal configuration problems. These halt the whole run (CLI exit 2)
/// instead of producing per-case failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
