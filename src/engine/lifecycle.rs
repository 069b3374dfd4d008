//! Soft deletion lifecycle: `soft_delete`, `undelete`, `list_deleted`.
//!
//! A soft delete appends a full chunk flagged `isDeleted` whose payload
//! is the complete pre-deletion state, so undelete and the deleted-
//! document listing never need a second rehydration. The deletion also
//! releases the document's unique-key slots on its branch.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::backend::Document;
use crate::chunk::Bound;
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::{BranchId, ChunkId, ChunkType, DocId, Epoch};
use crate::rehydrate::rehydrate;

use super::Chronicle;

/// Result of a `soft_delete`.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftDeleteResult {
    /// The deletion chunk
    pub chunk_id: ChunkId,
    /// Complete state at the moment of deletion
    pub final_state: Document,
}

/// Options for `undelete`.
#[derive(Debug, Clone, Default)]
pub struct UndeleteOptions {
    /// Epoch to restore; defaults to the highest
    pub epoch: Option<Epoch>,
    /// Branch to restore on; defaults to the active branch
    pub branch_id: Option<BranchId>,
}

/// Result of an `undelete`.
#[derive(Debug, Clone, PartialEq)]
pub struct UndeleteResult {
    pub doc_id: DocId,
    pub epoch: Epoch,
    pub restored_state: Document,
}

/// Time-window filters for `list_deleted`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletedFilter {
    pub deleted_after: Option<DateTime<Utc>>,
    pub deleted_before: Option<DateTime<Utc>>,
}

/// One entry in the deleted-document listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedDocument {
    pub doc_id: DocId,
    pub epoch: Epoch,
    pub deleted_at: DateTime<Utc>,
    pub final_state: Document,
}

impl Chronicle {
    /// Soft-delete `doc_id` on its active branch.
    pub fn soft_delete(&self, doc_id: &str) -> ChronicleResult<SoftDeleteResult> {
        let meta = self.require_metadata(doc_id)?;
        let branch_id = meta.active_branch_id;

        let latest = self
            .chunks
            .find_latest(doc_id, meta.epoch, &branch_id)?
            .ok_or_else(|| {
                ChronicleError::NotFound(format!("document {doc_id} has no chunks"))
            })?;
        if latest.is_deleted {
            return Err(ChronicleError::AlreadyDeleted(doc_id.to_string()));
        }

        let current = rehydrate(&self.chunks, doc_id, meta.epoch, &branch_id, &Bound::Latest)?
            .ok_or_else(|| {
                ChronicleError::Corrupt(format!(
                    "document {doc_id} has a latest chunk but no rehydratable state"
                ))
            })?;

        let chunk = self.new_chunk(
            doc_id,
            meta.epoch,
            &branch_id,
            latest.serial + 1,
            ChunkType::Full,
            true,
            current.state.clone(),
        );
        let chunk_id = chunk.chunk_id.clone();
        self.chunks.append(&chunk)?;
        self.keys.mark_deleted(doc_id, &branch_id)?;

        info!(doc_id, branch_id = %branch_id, serial = latest.serial + 1, "soft-deleted document");
        Ok(SoftDeleteResult {
            chunk_id,
            final_state: current.state,
        })
    }

    /// Restore a soft-deleted document from its deletion chunk.
    ///
    /// Fails with `UniqueConstraintViolation` when a live document on the
    /// same branch has taken one of the freed unique values since.
    pub fn undelete(
        &self,
        doc_id: &str,
        options: &UndeleteOptions,
    ) -> ChronicleResult<UndeleteResult> {
        let meta = match options.epoch {
            Some(epoch) => self.metadata.find(doc_id, epoch)?.ok_or_else(|| {
                ChronicleError::NotFound(format!("document {doc_id} has no epoch {epoch}"))
            })?,
            None => self.require_metadata(doc_id)?,
        };
        let branch = self.resolve_branch(&meta, options.branch_id.as_deref())?;

        let latest = self
            .chunks
            .find_latest(doc_id, meta.epoch, &branch.branch_id)?
            .ok_or_else(|| {
                ChronicleError::NotFound(format!(
                    "document {doc_id} has no chunks on branch {}",
                    branch.branch_id
                ))
            })?;
        if !latest.is_deleted {
            return Err(ChronicleError::NotDeleted(doc_id.to_string()));
        }

        // The deletion chunk is a full snapshot by construction.
        let restored = latest.payload.clone();
        self.keys
            .validate(&restored, &branch.branch_id, Some(doc_id))?;

        let chunk = self.new_chunk(
            doc_id,
            meta.epoch,
            &branch.branch_id,
            latest.serial + 1,
            ChunkType::Full,
            false,
            restored.clone(),
        );
        self.chunks.append(&chunk)?;
        self.keys
            .clear_deleted(doc_id, &branch.branch_id, &restored)?;

        info!(doc_id, branch_id = %branch.branch_id, epoch = meta.epoch, "restored document");
        Ok(UndeleteResult {
            doc_id: doc_id.to_string(),
            epoch: meta.epoch,
            restored_state: restored,
        })
    }

    /// All currently-deleted documents of the collection, newest deletion
    /// first, optionally restricted to a deletion-time window.
    pub fn list_deleted(&self, filter: &DeletedFilter) -> ChronicleResult<Vec<DeletedDocument>> {
        let chunks = self
            .chunks
            .list_latest_deleted(filter.deleted_after, filter.deleted_before)?;
        Ok(chunks
            .into_iter()
            .map(|chunk| DeletedDocument {
                doc_id: chunk.doc_id,
                epoch: chunk.epoch,
                deleted_at: chunk.c_time,
                final_state: chunk.payload,
            })
            .collect())
    }
}
