//! Error types shared across Granula crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, GranulaError>;

/// Errors raised while parsing or validating shared values
#[derive(Error, Debug)]
pub enum GranulaError {
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Invalid log setting: {0}")]
    InvalidLogSetting(String),
}
