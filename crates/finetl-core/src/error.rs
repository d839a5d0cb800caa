//! Error types for pipeline operations.
//!
//! This module defines [`EtlError`] which covers every failure the pipeline can
//! report. Failures are meant to be isolated at the smallest unit (one field,
//! one statement, one metric, one company); only configuration errors and an
//! unreachable store at startup are fatal.

use std::time::Duration;

use thiserror::Error;

use crate::period::StatementKind;

/// Errors that can occur while fetching, normalizing or persisting data.
#[derive(Error, Debug)]
pub enum EtlError {
    /// A quota window is exhausted and the caller chose not to wait.
    #[error("API quota exhausted: retry after {retry_after:?}")]
    QuotaExhausted {
        /// Time until a slot frees up.
        retry_after: Duration,
    },

    /// Timeouts, 5xx and 429 responses that persisted through every retry.
    #[error("Transient fetch failure for {symbol} {kind} after {attempts} attempts: {reason}")]
    TransientFetch {
        /// Ticker that was requested.
        symbol: String,
        /// Statement kind that was requested.
        kind: StatementKind,
        /// Number of attempts made.
        attempts: u32,
        /// Last failure observed.
        reason: String,
    },

    /// The API answered with an error body; retrying cannot succeed.
    #[error("Remote data error for {symbol} {kind}: {message}")]
    RemoteData {
        /// Ticker that was requested.
        symbol: String,
        /// Statement kind that was requested.
        kind: StatementKind,
        /// Message reported by the API.
        message: String,
    },

    /// Error writing to or reading from the backing store.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A fetch gave up because the run was cancelled or hit its deadline.
    #[error("Run cancelled")]
    Cancelled,

    /// Error parsing data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl EtlError {
    /// Returns true if waiting and trying again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. } | Self::TransientFetch { .. })
    }
}

/// Result type alias using [`EtlError`].
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let quota = EtlError::QuotaExhausted {
            retry_after: Duration::from_secs(12),
        };
        assert!(quota.is_retryable());

        let remote = EtlError::RemoteData {
            symbol: "XXXX".to_string(),
            kind: StatementKind::IncomeStatement,
            message: "Invalid API call".to_string(),
        };
        assert!(!remote.is_retryable());
        assert_eq!(
            remote.to_string(),
            "Remote data error for XXXX income_statement: Invalid API call"
        );

        assert!(!EtlError::Cancelled.is_retryable());
    }
}
