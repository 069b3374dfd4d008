//! The `revert` operation: roll a branch back to an earlier serial.
//!
//! Chunks past the target serial are deleted and the target becomes the
//! branch's latest. Child branches that diverged past the target keep
//! their own chunks (every child starts with its own full chunk) but
//! have their recorded divergence point pulled back to the target so the
//! attachment stays well-defined. The branch's key row is refreshed from
//! the reverted state.

use tracing::info;

use crate::backend::Document;
use crate::chunk::Bound;
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::{BranchId, Serial};
use crate::rehydrate::rehydrate;

use super::Chronicle;

/// Options for `revert`.
#[derive(Debug, Clone, Default)]
pub struct RevertOptions {
    /// Branch to revert; defaults to the active branch
    pub branch_id: Option<BranchId>,
    /// Return the reverted state in the result
    pub rehydrate: bool,
}

/// Result of a `revert`.
#[derive(Debug, Clone, PartialEq)]
pub struct RevertResult {
    pub success: bool,
    pub reverted_to_serial: Serial,
    pub chunks_removed: u64,
    pub branches_updated: u64,
    /// Present when requested via [`RevertOptions::rehydrate`]
    pub state: Option<Document>,
}

impl Chronicle {
    /// Roll the resolved branch back to `target_serial`.
    pub fn revert(
        &self,
        doc_id: &str,
        target_serial: Serial,
        options: &RevertOptions,
    ) -> ChronicleResult<RevertResult> {
        let meta = self.require_metadata(doc_id)?;
        let branch = self.resolve_branch(&meta, options.branch_id.as_deref())?;

        let target = self
            .chunks
            .find_by_serial(doc_id, meta.epoch, &branch.branch_id, target_serial)?
            .ok_or(ChronicleError::SerialNotFound {
                branch_id: branch.branch_id.clone(),
                serial: target_serial,
            })?;

        let latest = self
            .chunks
            .find_latest(doc_id, meta.epoch, &branch.branch_id)?
            .ok_or_else(|| {
                ChronicleError::Corrupt(format!(
                    "branch {} has chunks but no latest flag",
                    branch.branch_id
                ))
            })?;

        if latest.serial == target_serial {
            let state = if options.rehydrate {
                rehydrate(
                    &self.chunks,
                    doc_id,
                    meta.epoch,
                    &branch.branch_id,
                    &Bound::Serial(target_serial),
                )?
                .map(|r| r.state)
            } else {
                None
            };
            return Ok(RevertResult {
                success: true,
                reverted_to_serial: target_serial,
                chunks_removed: 0,
                branches_updated: 0,
                state,
            });
        }

        let chunks_removed =
            self.chunks
                .delete_after(doc_id, meta.epoch, &branch.branch_id, target_serial)?;
        self.chunks
            .set_latest(doc_id, meta.epoch, &branch.branch_id, target_serial)?;

        let branches_updated = self.branches.reattach_children(
            doc_id,
            meta.epoch,
            &branch.branch_id,
            target_serial,
        )?;

        // Refresh the branch's key row so unique slots reflect the
        // reverted state rather than the removed future.
        let reverted = rehydrate(
            &self.chunks,
            doc_id,
            meta.epoch,
            &branch.branch_id,
            &Bound::Serial(target_serial),
        )?
        .ok_or_else(|| {
            ChronicleError::Corrupt(format!(
                "branch {} lost its rehydratable state after revert",
                branch.branch_id
            ))
        })?;
        self.keys.upsert(
            doc_id,
            &branch.branch_id,
            &reverted.state,
            target.is_deleted,
        )?;

        info!(
            doc_id,
            branch_id = %branch.branch_id,
            target_serial,
            chunks_removed,
            branches_updated,
            "reverted branch"
        );

        Ok(RevertResult {
            success: true,
            reverted_to_serial: target_serial,
            chunks_removed,
            branches_updated,
            state: options.rehydrate.then_some(reverted.state),
        })
    }
}
