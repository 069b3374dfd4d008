//! # Rehydration Engine
//!
//! Reconstructs a document's state at an arbitrary `(branch, serial)` or
//! `(branch, time)` coordinate: scan the branch's chunks up to the bound,
//! take the most recent full chunk as the base, and fold every later
//! delta onto it.
//!
//! An empty scan means the coordinate precedes the branch's history and
//! is reported as "not found" (`Ok(None)`). A non-empty scan with no full
//! chunk cannot occur in a well-formed store (the first chunk of every
//! branch is full) and surfaces as [`ChronicleError::Corrupt`].

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::error;

use crate::backend::Document;
use crate::chunk::{Bound, ChunkStore};
use crate::delta;
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::{BranchId, ChunkType, Epoch, Serial};

/// A reconstructed document state.
#[derive(Debug, Clone, PartialEq)]
pub struct Rehydrated {
    /// The folded state; never contains the tombstone value
    pub state: Document,
    /// Serial of the newest chunk within the bound
    pub serial: Serial,
    pub branch_id: BranchId,
    /// `cTime` of the newest chunk within the bound
    pub chunk_timestamp: DateTime<Utc>,
}

/// Rebuild the state of `(doc_id, epoch, branch_id)` at `bound`.
pub fn rehydrate(
    chunks: &ChunkStore,
    doc_id: &str,
    epoch: Epoch,
    branch_id: &str,
    bound: &Bound,
) -> ChronicleResult<Option<Rehydrated>> {
    let scan = chunks.list_ordered(doc_id, epoch, branch_id, bound)?;

    let Some(newest) = scan.last() else {
        return Ok(None);
    };
    let serial = newest.serial;
    let chunk_timestamp = newest.c_time;

    let Some(base_index) = scan.iter().rposition(|c| c.cc_type == ChunkType::Full) else {
        error!(
            doc_id = %doc_id,
            branch_id = %branch_id,
            bound = ?bound,
            chunks = scan.len(),
            "no full chunk reachable within bound"
        );
        return Err(ChronicleError::Corrupt(format!(
            "no full chunk at or before serial {serial} on branch {branch_id} of document {doc_id}"
        )));
    };

    let mut state = strip_tombstones(&scan[base_index].payload);
    for chunk in &scan[base_index + 1..] {
        state = delta::apply(&state, &chunk.payload);
    }

    Ok(Some(Rehydrated {
        state,
        serial,
        branch_id: branch_id.to_string(),
        chunk_timestamp,
    }))
}

/// Drop tombstone-valued keys so the returned state never carries them.
fn strip_tombstones(payload: &Document) -> Document {
    payload
        .iter()
        .filter(|(_, value)| !matches!(value, Value::Null))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
