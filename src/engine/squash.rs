//! Destructive history operations: `squash` and `purge`.
//!
//! Both require explicit confirmation. Squash collapses every branch and
//! epoch of a document into a single full chunk on a fresh `main` at
//! epoch 1, carrying the state rehydrated at the target serial. Purge
//! removes the chronicle records of a document entirely (optionally one
//! epoch); after a full purge, a save with the same id starts a new
//! lineage at epoch 1.

use tracing::info;

use crate::backend::Document;
use crate::chunk::Bound;
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::{BranchId, ChronicleBranch, ChunkType, DocId, Epoch, Serial, MAIN_BRANCH};
use crate::rehydrate::rehydrate;

use super::Chronicle;

/// Options for `squash`.
#[derive(Debug, Clone, Default)]
pub struct SquashOptions {
    /// Branch whose state at the target serial becomes the new base;
    /// defaults to the active branch
    pub branch_id: Option<BranchId>,
    /// Destructive operations demand an explicit `true`
    pub confirm: bool,
    /// Report what would be removed without changing anything
    pub dry_run: bool,
}

/// What a squash would remove, plus the state it would keep.
#[derive(Debug, Clone, PartialEq)]
pub struct SquashDryRun {
    pub would_delete_chunks: u64,
    pub would_delete_branches: u64,
    pub new_base_state: Document,
}

/// Result of a `squash`.
#[derive(Debug, Clone, PartialEq)]
pub enum SquashOutcome {
    /// Nothing was changed; the counts describe what a real run removes
    DryRun(SquashDryRun),
    /// History was collapsed onto a fresh `main`
    Applied {
        doc_id: DocId,
        new_branch_id: BranchId,
        chunks_removed: u64,
        branches_removed: u64,
        new_base_state: Document,
    },
}

/// Options for `purge`.
#[derive(Debug, Clone, Default)]
pub struct PurgeOptions {
    /// Destructive operations demand an explicit `true`
    pub confirm: bool,
    /// Restrict removal to a single epoch
    pub epoch: Option<Epoch>,
}

/// Result of a `purge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeResult {
    pub doc_id: DocId,
    pub epochs_purged: u64,
    pub chunks_removed: u64,
    pub branches_removed: u64,
}

impl Chronicle {
    /// Collapse all history of `doc_id` into one full chunk carrying the
    /// state at `target_serial` on the resolved branch.
    pub fn squash(
        &self,
        doc_id: &str,
        target_serial: Serial,
        options: &SquashOptions,
    ) -> ChronicleResult<SquashOutcome> {
        if !options.confirm && !options.dry_run {
            return Err(ChronicleError::ConfirmationRequired {
                operation: "squash",
            });
        }

        let meta = self.require_metadata(doc_id)?;
        let branch = self.resolve_branch(&meta, options.branch_id.as_deref())?;

        if self
            .chunks
            .find_by_serial(doc_id, meta.epoch, &branch.branch_id, target_serial)?
            .is_none()
        {
            return Err(ChronicleError::SerialNotFound {
                branch_id: branch.branch_id.clone(),
                serial: target_serial,
            });
        }

        let new_base = rehydrate(
            &self.chunks,
            doc_id,
            meta.epoch,
            &branch.branch_id,
            &Bound::Serial(target_serial),
        )?
        .ok_or_else(|| {
            ChronicleError::Corrupt(format!(
                "no rehydratable state at serial {target_serial} on branch {}",
                branch.branch_id
            ))
        })?;

        let chunk_count = self.chunks.count(doc_id, None)?;
        let branch_count = self.branches.count(doc_id)?;

        if options.dry_run {
            return Ok(SquashOutcome::DryRun(SquashDryRun {
                would_delete_chunks: chunk_count,
                would_delete_branches: branch_count.saturating_sub(1),
                new_base_state: new_base.state,
            }));
        }

        let chunks_removed = self.chunks.delete_all(doc_id, None)?;
        let branches_removed = self.branches.delete_all(doc_id, None)?;

        let now = self.clock.now();
        let new_main = ChronicleBranch {
            branch_id: self.ids.next_id(),
            doc_id: doc_id.to_string(),
            epoch: 1,
            parent_branch_id: None,
            parent_serial: None,
            name: MAIN_BRANCH.to_string(),
            created_at: now,
        };
        self.branches.insert(&new_main)?;

        let chunk = self.new_chunk(
            doc_id,
            1,
            &new_main.branch_id,
            1,
            ChunkType::Full,
            false,
            new_base.state.clone(),
        );
        self.chunks.append(&chunk)?;

        self.metadata
            .reset_to_epoch_one(doc_id, &new_main.branch_id, now)?;

        // Key rows of the removed branches are gone with them; the fresh
        // main takes over the unique slots.
        self.keys.delete_for_doc(doc_id)?;
        self.keys
            .upsert(doc_id, &new_main.branch_id, &new_base.state, false)?;

        info!(
            doc_id,
            new_branch_id = %new_main.branch_id,
            chunks_removed,
            branches_removed,
            "squashed chronicle"
        );

        Ok(SquashOutcome::Applied {
            doc_id: doc_id.to_string(),
            new_branch_id: new_main.branch_id,
            chunks_removed,
            branches_removed,
            new_base_state: new_base.state,
        })
    }

    /// Remove every chronicle record of `doc_id`, optionally one epoch.
    pub fn purge(&self, doc_id: &str, options: &PurgeOptions) -> ChronicleResult<PurgeResult> {
        if !options.confirm {
            return Err(ChronicleError::ConfirmationRequired { operation: "purge" });
        }

        let metas = self.metadata.list(doc_id, options.epoch)?;
        if metas.is_empty() {
            return Err(ChronicleError::NotFound(match options.epoch {
                Some(epoch) => format!("document {doc_id} has no epoch {epoch}"),
                None => format!("document {doc_id} has no chronicle"),
            }));
        }

        // Key rows are branch-scoped, so an epoch-restricted purge must
        // resolve its branches before they are deleted.
        match options.epoch {
            None => {
                self.keys.delete_for_doc(doc_id)?;
            }
            Some(epoch) => {
                let branch_ids: Vec<String> = self
                    .branches
                    .list(doc_id, epoch)?
                    .into_iter()
                    .map(|b| b.branch_id)
                    .collect();
                self.keys.delete_for_branches(doc_id, &branch_ids)?;
            }
        }

        let chunks_removed = self.chunks.delete_all(doc_id, options.epoch)?;
        let branches_removed = self.branches.delete_all(doc_id, options.epoch)?;
        self.metadata.delete_all(doc_id, options.epoch)?;

        info!(
            doc_id,
            epoch = ?options.epoch,
            chunks_removed,
            branches_removed,
            "purged chronicle"
        );

        Ok(PurgeResult {
            doc_id: doc_id.to_string(),
            epochs_purged: metas.len() as u64,
            chunks_removed,
            branches_removed,
        })
    }
}
