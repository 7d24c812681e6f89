// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Timeout {0}s out of range (allowed: {min}-{max}s)", min = crate::domain::TimeoutSecs::MIN, max = crate::domain::TimeoutSecs::MAX)]
    TimeoutOutOfRange(u64),

    #[error("Source code too large: {size} bytes (max {max} bytes)")]
    SourceTooLarge { size: usize, max: usize },

    #[error("Blocked module name must not be empty or contain whitespace: {0:?}")]
    InvalidModuleName(String),

    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
