//! The `save` operation: create or update a document's chronicle.
//!
//! A save appends one chunk to the active branch. The first serial and
//! every cadence boundary get a full chunk; everything else gets a
//! forward delta against the rehydrated previous state, and an empty
//! delta is a no-op that appends nothing.
//!
//! Concurrent saves on the same branch race on the chunk coordinate
//! index: the loser re-reads the latest chunk and retries.

use tracing::debug;

use crate::backend::{Document, StoreError};
use crate::branch::{BRANCH_IDENTITY_INDEX, DOC_EPOCH_INDEX};
use crate::chunk::{is_serial_conflict, Bound};
use crate::delta;
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::{
    ChronicleBranch, ChunkId, ChunkType, DocId, Serial, MAIN_BRANCH,
};
use crate::rehydrate::rehydrate;

use super::{sanitize_payload, Chronicle};

/// Bounded retries for lost append races.
const MAX_SAVE_ATTEMPTS: u32 = 5;

/// Result of a `save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A chunk was appended at `serial`
    Written {
        doc_id: DocId,
        chunk_id: ChunkId,
        serial: Serial,
        cc_type: ChunkType,
    },
    /// The payload matched the current state; nothing was appended
    Unchanged { doc_id: DocId, serial: Serial },
}

impl SaveOutcome {
    /// The appended chunk id, if any.
    pub fn chunk_id(&self) -> Option<&str> {
        match self {
            Self::Written { chunk_id, .. } => Some(chunk_id),
            Self::Unchanged { .. } => None,
        }
    }

    /// The branch's latest serial after the save.
    pub fn serial(&self) -> Serial {
        match self {
            Self::Written { serial, .. } | Self::Unchanged { serial, .. } => *serial,
        }
    }
}

/// True when a storage error is a lost save race worth retrying: the
/// chunk serial, the `(docId, epoch)` metadata identity, or the root
/// branch identity was claimed by a concurrent writer.
fn is_save_conflict(err: &StoreError) -> bool {
    if is_serial_conflict(err) {
        return true;
    }
    matches!(
        err,
        StoreError::DuplicateKey { index, .. }
            if index == DOC_EPOCH_INDEX || index == BRANCH_IDENTITY_INDEX
    )
}

impl Chronicle {
    /// Record `payload` as the next version of `doc_id` on its active
    /// branch, creating the chronicle (epoch 1, `main`) on first save.
    pub fn save(&self, doc_id: &str, payload: &Document) -> ChronicleResult<SaveOutcome> {
        let payload = sanitize_payload(payload);
        let mut attempt = 0;
        loop {
            match self.try_save(doc_id, &payload) {
                Err(ChronicleError::Storage(err))
                    if is_save_conflict(&err) && attempt + 1 < MAX_SAVE_ATTEMPTS =>
                {
                    attempt += 1;
                    debug!(doc_id, attempt, "save lost an append race, retrying");
                }
                other => return other,
            }
        }
    }

    fn try_save(&self, doc_id: &str, payload: &Document) -> ChronicleResult<SaveOutcome> {
        let existing = self.metadata.latest_epoch(doc_id)?;
        let updating = existing.is_some();

        let (epoch, branch_id, current_serial, previous, reviving) = match existing {
            Some(meta) => {
                let branch_id = meta.active_branch_id;
                let latest = self.chunks.find_latest(doc_id, meta.epoch, &branch_id)?;
                let current_serial = latest.as_ref().map(|c| c.serial).unwrap_or(0);
                let reviving = latest.is_some_and(|c| c.is_deleted);
                let previous =
                    rehydrate(&self.chunks, doc_id, meta.epoch, &branch_id, &Bound::Latest)?
                        .map(|r| r.state);
                (meta.epoch, branch_id, current_serial, previous, reviving)
            }
            None => {
                // Create path: branch and pending metadata precede the
                // first chunk commit. The root branch carries the shared
                // `main` identity so unique keys bind across documents
                // that never branched.
                let now = self.clock.now();
                let branch = ChronicleBranch {
                    branch_id: MAIN_BRANCH.to_string(),
                    doc_id: doc_id.to_string(),
                    epoch: 1,
                    parent_branch_id: None,
                    parent_serial: None,
                    name: MAIN_BRANCH.to_string(),
                    created_at: now,
                };
                self.branches.insert(&branch)?;
                self.metadata
                    .insert_pending(doc_id, 1, &branch.branch_id, now)?;
                (1, branch.branch_id, 0, None, false)
            }
        };

        self.keys
            .validate(payload, &branch_id, updating.then_some(doc_id))?;

        let next_serial = current_serial + 1;
        // A save onto a deleted latest chunk revives the document; it gets
        // a full chunk so an unchanged payload still flips the deletion.
        let should_full = current_serial == 0
            || next_serial % self.config.full_chunk_interval == 0
            || reviving;

        let (cc_type, chunk_payload) = if should_full {
            (ChunkType::Full, payload.clone())
        } else {
            let empty = Document::new();
            let base = previous.as_ref().unwrap_or(&empty);
            let patch = delta::compute(base, payload);
            if delta::is_empty(&patch) {
                debug!(doc_id, serial = current_serial, "save changed nothing");
                return Ok(SaveOutcome::Unchanged {
                    doc_id: doc_id.to_string(),
                    serial: current_serial,
                });
            }
            (ChunkType::Delta, patch)
        };

        let chunk = self.new_chunk(
            doc_id,
            epoch,
            &branch_id,
            next_serial,
            cc_type,
            false,
            chunk_payload,
        );
        let chunk_id = chunk.chunk_id.clone();
        self.chunks.append(&chunk)?;
        self.keys.upsert(doc_id, &branch_id, payload, false)?;

        // Finalization: pending lineages become active only after the
        // chunk and key row are committed.
        self.metadata.set_active(doc_id, epoch, self.clock.now())?;

        Ok(SaveOutcome::Written {
            doc_id: doc_id.to_string(),
            chunk_id,
            serial: next_serial,
            cc_type,
        })
    }
}
