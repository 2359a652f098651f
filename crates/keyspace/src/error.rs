//! Error types for the key-value layer.

use thiserror::Error;

/// Failures raised by transactions and storage backends.
#[derive(Debug, Error)]
pub enum KvError {
    /// Another transaction committed a write that intersects our read set.
    #[error("transaction not committed due to conflict with another transaction")]
    NotCommitted,

    /// The read version fell out of the oracle's conflict window.
    #[error("transaction is too old to perform reads or be committed")]
    TransactionTooOld,

    #[error("transaction exceeds byte limit: {size} bytes (limit {limit})")]
    TransactionTooLarge { size: usize, limit: usize },

    /// Transient storage failure. Safe to retry.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// The writes reached the engine but the commit could not be confirmed.
    /// Never retried: a second run would not see its own first attempt.
    #[error("commit result unknown: {0}")]
    CommitUnknown(String),

    #[error("gave up after {attempts} attempts: {source}")]
    RetryLimitExceeded {
        attempts: u32,
        #[source]
        source: Box<KvError>,
    },
}

impl KvError {
    /// Whether `Database::run` should re-run the transaction body.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KvError::NotCommitted | KvError::TransactionTooOld | KvError::Unavailable(_)
        )
    }
}

impl From<sled::Error> for KvError {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(io) => KvError::Unavailable(io.to_string()),
            other => KvError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(KvError::NotCommitted.is_retryable());
        assert!(KvError::TransactionTooOld.is_retryable());
        assert!(KvError::Unavailable("disk".into()).is_retryable());
        assert!(!KvError::TransactionTooLarge { size: 2, limit: 1 }.is_retryable());
        assert!(!KvError::Storage("broken".into()).is_retryable());
        assert!(!KvError::CommitUnknown("flush".into()).is_retryable());
    }

    #[test]
    fn test_retry_limit_display_includes_cause() {
        let err = KvError::RetryLimitExceeded {
            attempts: 3,
            source: Box::new(KvError::NotCommitted),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("conflict"));
    }
}
