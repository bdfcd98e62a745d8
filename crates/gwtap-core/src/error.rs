//! Error types for the core crate.

use thiserror::Error;

/// Malformed capability bitmask input.
///
/// Surfaced to configuration and operator surfaces only; the interception
/// pipeline never propagates it across the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability bitmask is empty")]
    Empty,

    #[error("capability bitmask must contain only decimal digits, got {0:?}")]
    NotDecimal(String),

    #[error("capability bitmask must not be negative, got {0}")]
    Negative(i64),

    #[error("capability bitmask {0} does not fit in 32 bits")]
    OutOfRange(String),

    #[error("capability bitmask must be an integer, got {0}")]
    NotInteger(String),

    #[error("capability bit position {0} is outside 0..=31")]
    BitOutOfRange(u8),
}

/// Failure decoding a call-trace payload.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("call trace is not valid wire json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("call trace field must be an array, got {0}")]
    NotAnArray(&'static str),
}
