//! Centralized error taxonomy for the doorbell firmware.
//!
//! Every subsystem returns [`DoorbellError`], mapped 1:1 onto the six error
//! classes every component contract is specified against: caller mistakes
//! fail fast without mutating state, bounded waits time out, and downstream
//! driver/library failures are distinguished from "this operation simply
//! isn't supported".

use thiserror::Error;

/// Application-wide error type for the doorbell firmware.
#[derive(Debug, Error)]
pub enum DoorbellError {
    /// Caller-side contract violation; no state was changed.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Operation is not valid in the component's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Requested capability/format is not negotiable.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A bounded wait elapsed before the operation completed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Allocation or hardware bring-up failure.
    #[error("no resources: {0}")]
    NoResources(String),

    /// Downstream driver, library, or I/O failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DoorbellError {
    /// Returns a machine-readable error code, mirroring the §7 taxonomy name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArg(_) => "INVALID_ARG",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::NotSupported(_) => "NOT_SUPPORTED",
            Self::Timeout(_) => "TIMEOUT",
            Self::NoResources(_) => "NO_RESOURCES",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<std::io::Error> for DoorbellError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for DoorbellError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

/// Convenient Result alias for firmware-wide operations.
pub type DoorbellResult<T> = Result<T, DoorbellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_taxonomy_names() {
        assert_eq!(DoorbellError::InvalidArg("x".into()).code(), "INVALID_ARG");
        assert_eq!(DoorbellError::Timeout("x".into()).code(), "TIMEOUT");
        assert_eq!(
            DoorbellError::NoResources("x".into()).code(),
            "NO_RESOURCES"
        );
    }
}
