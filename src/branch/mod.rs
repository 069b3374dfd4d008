//! # Branch & Epoch Management
//!
//! Branches form a forest per `(docId, epoch)`, rooted at `main`; each
//! non-root records the parent branch and the parent serial it diverged
//! at. Metadata carries one row per `(docId, epoch)` with the active
//! branch (the one receiving saves) and the lifecycle status.
//!
//! Epochs partition successive incarnations of a reused document
//! identity: squash resets a document to a single-chunk `main` at epoch
//! 1, and a save after a full purge starts a fresh lineage at epoch 1.

mod metadata;
mod store;

pub use metadata::{MetadataStore, DOC_EPOCH_INDEX};
pub use store::{BranchStore, BRANCH_IDENTITY_INDEX};
