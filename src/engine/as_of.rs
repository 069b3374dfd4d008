//! Point-in-time reads: `as_of`.
//!
//! Single-branch reads rehydrate the resolved branch bounded by the asked
//! time. Search-all reads pick, across every branch of the epoch, the
//! branch whose newest chunk at-or-before the asked time is the most
//! recent (ties broken by highest branch id), then rehydrate there. A
//! time in the future simply yields the current latest state.

use chrono::{DateTime, Utc};

use crate::backend::Document;
use crate::chunk::Bound;
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::{BranchId, ChronicleChunk, Epoch, Serial};
use crate::rehydrate::{rehydrate, Rehydrated};

use super::Chronicle;

/// Options for `as_of`.
#[derive(Debug, Clone, Default)]
pub struct AsOfOptions {
    /// Read a specific branch instead of the active one
    pub branch_id: Option<BranchId>,
    /// Search every branch of the epoch for the most recent state
    pub search_all_branches: bool,
}

/// Result of an `as_of` read.
#[derive(Debug, Clone, PartialEq)]
pub struct AsOfResult {
    pub found: bool,
    pub state: Option<Document>,
    pub serial: Option<Serial>,
    pub branch_id: Option<BranchId>,
    pub chunk_timestamp: Option<DateTime<Utc>>,
}

impl AsOfResult {
    fn not_found() -> Self {
        Self {
            found: false,
            state: None,
            serial: None,
            branch_id: None,
            chunk_timestamp: None,
        }
    }
}

impl From<Rehydrated> for AsOfResult {
    fn from(rehydrated: Rehydrated) -> Self {
        Self {
            found: true,
            state: Some(rehydrated.state),
            serial: Some(rehydrated.serial),
            branch_id: Some(rehydrated.branch_id),
            chunk_timestamp: Some(rehydrated.chunk_timestamp),
        }
    }
}

impl Chronicle {
    /// The document's state as of `instant`.
    pub fn as_of(
        &self,
        doc_id: &str,
        instant: DateTime<Utc>,
        options: &AsOfOptions,
    ) -> ChronicleResult<AsOfResult> {
        if options.branch_id.is_some() && options.search_all_branches {
            return Err(ChronicleError::MutuallyExclusiveOptions(
                "branch_id and search_all_branches",
            ));
        }

        let meta = self.require_metadata(doc_id)?;

        if options.search_all_branches {
            let Some(candidate) = self.best_branch_at(doc_id, meta.epoch, instant)? else {
                return Ok(AsOfResult::not_found());
            };
            let rehydrated = rehydrate(
                &self.chunks,
                doc_id,
                meta.epoch,
                &candidate.branch_id,
                &Bound::Time(instant),
            )?;
            return Ok(rehydrated.map(Into::into).unwrap_or_else(AsOfResult::not_found));
        }

        let branch = self.resolve_branch(&meta, options.branch_id.as_deref())?;
        let rehydrated = rehydrate(
            &self.chunks,
            doc_id,
            meta.epoch,
            &branch.branch_id,
            &Bound::Time(instant),
        )?;
        Ok(rehydrated.map(Into::into).unwrap_or_else(AsOfResult::not_found))
    }

    /// Across all branches of the epoch, the chunk with the greatest
    /// `cTime` at-or-before `instant` (ties: highest branch id).
    fn best_branch_at(
        &self,
        doc_id: &str,
        epoch: Epoch,
        instant: DateTime<Utc>,
    ) -> ChronicleResult<Option<ChronicleChunk>> {
        let mut best: Option<ChronicleChunk> = None;
        for branch in self.branches.list(doc_id, epoch)? {
            let Some(candidate) =
                self.chunks
                    .latest_at_time(doc_id, epoch, &branch.branch_id, instant)?
            else {
                continue;
            };
            let better = match &best {
                None => true,
                Some(current) => {
                    (candidate.c_time, &candidate.branch_id) > (current.c_time, &current.branch_id)
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        Ok(best)
    }
}
