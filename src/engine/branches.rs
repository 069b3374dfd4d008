//! Branch operations: `create_branch`, `switch_branch`, `list_branches`,
//! `get_active_branch`.
//!
//! A new branch diverges from the active branch at a chosen serial
//! (default: its latest) and starts with its own full chunk carrying the
//! rehydrated state at that point, so rehydration on the child never
//! walks the parent.

use tracing::info;

use crate::chunk::Bound;
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::{ChronicleBranch, ChunkType, Serial};
use crate::rehydrate::rehydrate;

use super::Chronicle;

/// Options for `create_branch`.
#[derive(Debug, Clone, Default)]
pub struct CreateBranchOptions {
    /// Serial on the parent to diverge at; defaults to the parent's latest
    pub from_serial: Option<Serial>,
    /// Make the new branch the active one
    pub activate: bool,
}

impl Chronicle {
    /// Create a branch named `name` off the active branch.
    pub fn create_branch(
        &self,
        doc_id: &str,
        name: &str,
        options: &CreateBranchOptions,
    ) -> ChronicleResult<ChronicleBranch> {
        let meta = self.require_metadata(doc_id)?;
        let parent_id = meta.active_branch_id.clone();

        let parent_latest = self
            .chunks
            .find_latest(doc_id, meta.epoch, &parent_id)?
            .ok_or_else(|| ChronicleError::NoChunks(doc_id.to_string()))?;

        let from_serial = options.from_serial.unwrap_or(parent_latest.serial);
        if options.from_serial.is_some()
            && self
                .chunks
                .find_by_serial(doc_id, meta.epoch, &parent_id, from_serial)?
                .is_none()
        {
            return Err(ChronicleError::SerialNotFound {
                branch_id: parent_id,
                serial: from_serial,
            });
        }

        let state = rehydrate(
            &self.chunks,
            doc_id,
            meta.epoch,
            &parent_id,
            &Bound::Serial(from_serial),
        )?
        .ok_or_else(|| {
            ChronicleError::Corrupt(format!(
                "no rehydratable state at serial {from_serial} on branch {parent_id}"
            ))
        })?;

        let branch = ChronicleBranch {
            branch_id: self.ids.next_id(),
            doc_id: doc_id.to_string(),
            epoch: meta.epoch,
            parent_branch_id: Some(parent_id),
            parent_serial: Some(from_serial),
            name: name.to_string(),
            created_at: self.clock.now(),
        };
        self.branches.insert(&branch)?;

        let chunk = self.new_chunk(
            doc_id,
            meta.epoch,
            &branch.branch_id,
            1,
            ChunkType::Full,
            false,
            state.state.clone(),
        );
        self.chunks.append(&chunk)?;

        // The new branch holds its own unique slots from the branched
        // state onward.
        self.keys
            .upsert(doc_id, &branch.branch_id, &state.state, false)?;

        if options.activate {
            self.metadata.set_active_branch(
                doc_id,
                meta.epoch,
                &branch.branch_id,
                self.clock.now(),
            )?;
        }

        info!(
            doc_id,
            branch_id = %branch.branch_id,
            name,
            from_serial,
            activated = options.activate,
            "created branch"
        );
        Ok(branch)
    }

    /// Point subsequent saves at `branch_id`.
    ///
    /// Saves that already resolved their branch complete there; the
    /// switch only affects operations that start afterwards.
    pub fn switch_branch(&self, doc_id: &str, branch_id: &str) -> ChronicleResult<()> {
        let meta = self.require_metadata(doc_id)?;
        if self
            .branches
            .find(doc_id, meta.epoch, branch_id)?
            .is_none()
        {
            return Err(ChronicleError::BranchNotFound {
                doc_id: doc_id.to_string(),
                branch_id: branch_id.to_string(),
            });
        }
        self.metadata
            .set_active_branch(doc_id, meta.epoch, branch_id, self.clock.now())?;
        info!(doc_id, branch_id, "switched active branch");
        Ok(())
    }

    /// All branches of the document's highest epoch, oldest first.
    pub fn list_branches(&self, doc_id: &str) -> ChronicleResult<Vec<ChronicleBranch>> {
        match self.metadata.latest_epoch(doc_id)? {
            Some(meta) => Ok(self.branches.list(doc_id, meta.epoch)?),
            None => Ok(Vec::new()),
        }
    }

    /// The branch currently receiving saves, if the document exists.
    pub fn get_active_branch(&self, doc_id: &str) -> ChronicleResult<Option<ChronicleBranch>> {
        match self.metadata.latest_epoch(doc_id)? {
            Some(meta) => Ok(self
                .branches
                .find(doc_id, meta.epoch, &meta.active_branch_id)?),
            None => Ok(None),
        }
    }
}
