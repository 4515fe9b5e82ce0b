//! Errors of queued persistence operations.
//!
//! These never reach the caller of a public operation directly: the
//! execution queue logs them, publishes them as
//! [`FailedOperation`](crate::queue::FailedOperation) and resolves the
//! operation's handle to `None`.

use crate::merge::MergeError;
use crate::storage::StoreError;

/// Failure of one queued operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// The document store rejected or failed a call
    Store(StoreError),
    /// The merge engine could not interpret a stored blob
    Merge(MergeError),
    /// A metadata value could not be converted
    Meta(String),
    /// The operation body panicked; carries the panic message
    Panicked(String),
    /// The persistence instance has been closed
    Closed,
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Store(e) => write!(f, "Store error: {e}"),
            PersistenceError::Merge(e) => write!(f, "Merge error: {e}"),
            PersistenceError::Meta(e) => write!(f, "Metadata error: {e}"),
            PersistenceError::Panicked(msg) => write!(f, "Operation panicked: {msg}"),
            PersistenceError::Closed => write!(f, "Persistence instance is closed"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Store(e) => Some(e),
            PersistenceError::Merge(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for PersistenceError {
    fn from(e: StoreError) -> Self {
        PersistenceError::Store(e)
    }
}

impl From<MergeError> for PersistenceError {
    fn from(e: MergeError) -> Self {
        PersistenceError::Merge(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Meta(e.to_string())
    }
}

/// Result of a queued operation body.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_conversions_keep_source() {
        let err = PersistenceError::from(StoreError::Closed);
        assert!(err.to_string().starts_with("Store error"));
        assert!(err.source().is_some());

        let err = PersistenceError::from(MergeError::Decode("eof".into()));
        assert!(err.to_string().contains("Malformed update: eof"));
        assert!(PersistenceError::Closed.source().is_none());
    }
}
