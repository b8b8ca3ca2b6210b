use thiserror::Error;

/// Problems with a single record at the store boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("unknown {kind} status: {value}")]
    UnknownStatus { kind: &'static str, value: String },

    #[error("amount must be a finite, non-negative number (got {0})")]
    InvalidAmount(f64),

    #[error("duration must be non-negative (got {0} minutes)")]
    InvalidDuration(i32),

    #[error("{field} must be between 1 and 10 (got {value})")]
    ScoreOutOfRange { field: &'static str, value: i32 },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}
