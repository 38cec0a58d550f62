use codeindex_core::Error as CoreError;
use std::time::Duration;
use thiserror::Error;

/// Storage-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Another writer committed the file after this transaction began
    #[error("Write conflict on {file_id}: {message}")]
    Conflict { file_id: String, message: String },

    /// The commit carries an older generation than the one already visible
    #[error("Stale commit for {file_id}: generation {attempted} is older than {current}")]
    StaleVersion {
        file_id: String,
        attempted: u64,
        current: u64,
    },

    /// The staged state does not match the chunk set being committed
    #[error("Commit set mismatch for {file_id}: {missing} missing, {unexpected} unexpected")]
    SetMismatch {
        file_id: String,
        missing: usize,
        unexpected: usize,
    },

    #[error("Unknown transaction {0}")]
    UnknownTransaction(u64),

    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { file_id, message } => {
                CoreError::reconciliation_conflict(file_id, message)
            }
            StorageError::StaleVersion {
                file_id, attempted, ..
            } => CoreError::StaleRun {
                file_id,
                generation: attempted,
            },
            StorageError::Timeout(ms) => {
                CoreError::timeout("index write", Duration::from_millis(ms))
            }
            StorageError::SetMismatch { .. } | StorageError::UnknownTransaction(_) => {
                CoreError::invalid_input(err.to_string())
            }
            StorageError::BackendError(_) => CoreError::storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_mapping() {
        let conflict: CoreError = StorageError::Conflict {
            file_id: "f".into(),
            message: "raced".into(),
        }
        .into();
        assert!(matches!(conflict, CoreError::ReconciliationConflict { .. }));

        let stale: CoreError = StorageError::StaleVersion {
            file_id: "f".into(),
            attempted: 1,
            current: 2,
        }
        .into();
        assert!(matches!(stale, CoreError::StaleRun { generation: 1, .. }));
        assert!(!stale.is_transient());

        let backend: CoreError = StorageError::BackendError("down".into()).into();
        assert!(backend.is_transient());

        let mismatch: CoreError = StorageError::SetMismatch {
            file_id: "f".into(),
            missing: 1,
            unexpected: 0,
        }
        .into();
        assert!(!mismatch.is_transient());
    }
}
