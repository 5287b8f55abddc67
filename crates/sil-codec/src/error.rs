//! Codec and bus error types.

use thiserror::Error;

/// Errors raised while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload too short for E2E header: {len} bytes")]
    PayloadTooShort { len: usize },

    #[error("unknown message '{0}'")]
    UnknownMessage(String),

    #[error("length mismatch for {message}: expected {expected} bytes, got {got}")]
    Length {
        message: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Convenience alias for codec results.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during CAN bus operations.
#[derive(Debug, Error)]
pub enum CanError {
    #[error("CAN interface error: {0}")]
    Interface(String),

    #[error("receive timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("CAN bus closed")]
    Closed,
}

/// Convenience alias for CAN bus results.
pub type CanResult<T> = Result<T, CanError>;
