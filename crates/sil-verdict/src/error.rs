//! Verdict checker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("timeout waiting for {what} after {timeout_ms}ms")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("fault API error: {0}")]
    Api(String),

    #[error("process control error: {0}")]
    Process(String),

    #[error("unknown vehicle state '{0}'")]
    UnknownState(String),

    #[error("scenario definition error: {0}")]
    Definition(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for verdict-checker results.
pub type VerdictResult<T> = Result<T, VerdictError>;
