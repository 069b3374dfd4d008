//! # Chunk Store
//!
//! Append-only persistence for [`ChronicleChunk`](crate::model::ChronicleChunk)
//! records, scoped by `(docId, epoch, branchId)`.
//!
//! Invariants maintained here:
//! - serials are unique within a group (unique coordinate index; a lost
//!   append race surfaces as a duplicate-key error for the caller to retry)
//! - at most one chunk per group carries `isLatest`, flipped by the
//!   clear-then-append sequence; readers prefer the highest serial during
//!   the transient overlap window

mod store;

pub use store::{Bound, ChunkStore, SERIAL_CONFLICT_INDEX};

pub(crate) use store::is_serial_conflict;
