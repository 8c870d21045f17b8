//! Store Errors
//!
//! Error types for row store, transaction scope and transfer operations.

use std::fmt;

/// SQLSTATE codes that signal transient lock contention.
const DEADLOCK_DETECTED: &str = "40P01";
const SERIALIZATION_FAILURE: &str = "40001";
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Integrity constraint violation class (foreign key, unique, check, ...)
const INTEGRITY_CONSTRAINT_CLASS: &str = "23";

/// Step of the transfer transaction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    CreateTransfer,
    CreateFromEntry,
    CreateToEntry,
    UpdateBalance,
}

impl TransferStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStage::CreateTransfer => "create transfer",
            TransferStage::CreateFromEntry => "create from entry",
            TransferStage::CreateToEntry => "create to entry",
            TransferStage::UpdateBalance => "update balance",
        }
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A step of the transfer transaction was rejected by the database
    #[error("{stage} failed: {source}")]
    Stage {
        stage: TransferStage,
        #[source]
        source: sqlx::Error,
    },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The unit of work succeeded but the commit did not
    #[error("Commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    /// The unit of work failed and so did the rollback
    #[error("tx err: {source}, rb err: {rollback}")]
    Rollback {
        source: Box<StoreError>,
        rollback: sqlx::Error,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled by caller")]
    Cancelled,
}

impl StoreError {
    pub fn stage(stage: TransferStage, source: sqlx::Error) -> Self {
        Self::Stage { stage, source }
    }

    /// Stage of the transfer that failed, if this error came from one
    pub fn failed_stage(&self) -> Option<TransferStage> {
        match self {
            StoreError::Stage { stage, .. } => Some(*stage),
            StoreError::Rollback { source, .. } => source.failed_stage(),
            _ => None,
        }
    }

    /// Check if the caller cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        match self {
            StoreError::Cancelled => true,
            StoreError::Rollback { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is transient lock contention the caller may retry
    pub fn is_retryable(&self) -> bool {
        if matches!(self.sqlx_error(), Some(sqlx::Error::PoolTimedOut)) {
            return true;
        }
        matches!(
            self.sqlstate().as_deref(),
            Some(DEADLOCK_DETECTED | SERIALIZATION_FAILURE | LOCK_NOT_AVAILABLE)
        )
    }

    /// Check if the requested row does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.sqlx_error(), Some(sqlx::Error::RowNotFound))
    }

    /// Check if the database rejected the write on an integrity constraint
    /// (e.g. unknown account id)
    pub fn is_constraint_violation(&self) -> bool {
        self.sqlstate()
            .is_some_and(|code| code.starts_with(INTEGRITY_CONSTRAINT_CLASS))
    }

    /// Underlying driver error that triggered this failure
    pub fn sqlx_error(&self) -> Option<&sqlx::Error> {
        match self {
            StoreError::Stage { source, .. } => Some(source),
            StoreError::Database(e) | StoreError::Commit(e) => Some(e),
            StoreError::Rollback { source, .. } => source.sqlx_error(),
            StoreError::Cancelled => None,
        }
    }

    fn sqlstate(&self) -> Option<String> {
        match self.sqlx_error()? {
            sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
            _ => None,
        }
    }
}
