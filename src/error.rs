//! # Chronicle Errors
//!
//! Error taxonomy for the chronicle engine. Storage-level failures are
//! wrapped as [`ChronicleError::Storage`]; duplicate-key errors raised by a
//! backend's partial unique indexes are normalized into
//! [`ChronicleError::UniqueConstraintViolation`] at the key-index boundary.

use serde_json::Value;
use thiserror::Error;

use crate::backend::StoreError;

/// Result type for chronicle operations
pub type ChronicleResult<T> = Result<T, ChronicleError>;

/// Errors surfaced by chronicle operations
#[derive(Debug, Error)]
pub enum ChronicleError {
    // ==================
    // Lookup Errors
    // ==================
    /// No metadata, chunks, or branch at the given coordinates
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested serial does not exist on the resolved branch
    #[error("serial {serial} does not exist on branch {branch_id}")]
    SerialNotFound { branch_id: String, serial: u64 },

    /// The branch does not belong to the document
    #[error("branch {branch_id} does not belong to document {doc_id}")]
    BranchNotFound { doc_id: String, branch_id: String },

    /// The document has no chunks to branch from
    #[error("document {0} has no chunks")]
    NoChunks(String),

    // ==================
    // Lifecycle Errors
    // ==================
    /// Soft delete requested but the latest chunk is already a deletion
    #[error("document {0} is already deleted")]
    AlreadyDeleted(String),

    /// Undelete requested but the latest chunk is live
    #[error("document {0} is not deleted")]
    NotDeleted(String),

    // ==================
    // Constraint Errors
    // ==================
    /// A declared unique field already holds this value on the branch
    #[error("unique constraint violation on field `{field}` (value {value})")]
    UniqueConstraintViolation { field: String, value: Value },

    /// Destructive operation invoked without explicit confirmation
    #[error("{operation} is destructive and requires confirmation")]
    ConfirmationRequired { operation: &'static str },

    /// Ill-formed option combination
    #[error("mutually exclusive options: {0}")]
    MutuallyExclusiveOptions(&'static str),

    // ==================
    // Integrity Errors
    // ==================
    /// A rehydration scan found chunks but no full chunk within the bound.
    /// Never expected in a well-formed store.
    #[error("chronicle corrupt: {0}")]
    Corrupt(String),

    /// The chronicle collections for this document collection are missing
    #[error("chronicle not initialized for collection {0}")]
    NotInitialized(String),

    /// Backing store failure
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ChronicleError {
    /// True if retrying the operation with different input may succeed.
    ///
    /// Constraint and lifecycle errors are recoverable; `Corrupt` and
    /// storage failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UniqueConstraintViolation { .. }
                | Self::AlreadyDeleted(_)
                | Self::NotDeleted(_)
                | Self::ConfirmationRequired { .. }
                | Self::MutuallyExclusiveOptions(_)
        )
    }
}
