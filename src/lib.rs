//! chronicledb - append-only document version chronicle
//!
//! Turns a conventional document store into a chronicle of every change
//! per document: full/delta chunk history, Git-like branching, epoch
//! generations for reused identities, point-in-time reads, revert and
//! squash, recoverable soft deletion, and history-aware unique keys.

pub mod backend;
pub mod branch;
pub mod chunk;
pub mod delta;
pub mod engine;
pub mod error;
pub mod keys;
pub mod model;
pub mod rehydrate;

pub use engine::{
    AsOfOptions, AsOfResult, Chronicle, CreateBranchOptions, DeletedDocument, DeletedFilter,
    InitOptions, PurgeOptions, PurgeResult, RevertOptions, RevertResult, SaveOutcome,
    SoftDeleteResult, SquashDryRun, SquashOptions, SquashOutcome, UndeleteOptions, UndeleteResult,
};
pub use error::{ChronicleError, ChronicleResult};
