//! # Backend Collection Abstraction
//!
//! The chronicle engine persists through an abstract document-collection
//! API: indexed finds, upserts, and atomic single-document updates. Any
//! store offering these (and partial unique indexes) can host a chronicle.
//!
//! This module provides:
//! - [`Collection`] - the per-collection operations the engine consumes
//! - [`DocumentStore`] - a provider of named collection handles
//! - [`Filter`] / [`Update`] / [`FindOptions`] - the query vocabulary
//! - [`IndexSpec`] - index declarations, including partial unique indexes
//! - [`MemoryStore`] - the in-process reference backend
//! - [`IdFactory`] / [`Clock`] - identifier and instant generation

mod clock;
mod filter;
mod id;
mod index;
mod memory;

pub use clock::{Clock, SystemClock};
pub use filter::{cmp_values, lookup_path, Cmp, Filter, FindOptions, SortOrder, Update};
pub use id::{IdFactory, UuidFactory};
pub use index::IndexSpec;
pub use memory::{MemoryCollection, MemoryStore};

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// A stored document: a flat attribute map of JSON values.
pub type Document = serde_json::Map<String, Value>;

/// Result type for backend operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a backing store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write
    #[error("duplicate key on index `{index}`: field `{field}` value {value}")]
    DuplicateKey {
        index: String,
        field: String,
        value: Value,
    },

    /// Interior lock was poisoned by a panicking writer
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// Document could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store is unreachable
    #[error("store unavailable: {0}")]
    NotConnected(String),
}

/// Outcome of an `update_one` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Number of documents matched by the filter (0 or 1)
    pub matched: u64,
    /// True if the update inserted a new document via upsert
    pub upserted: bool,
}

/// One collection of documents.
///
/// Every method is a store round-trip: concurrent operations on the same
/// document may interleave between any two calls. Implementations must
/// provide per-document atomicity for each individual call.
pub trait Collection: Send + Sync {
    /// Collection name
    fn name(&self) -> &str;

    /// Insert a single document. Fails with [`StoreError::DuplicateKey`]
    /// when a unique index rejects it.
    fn insert_one(&self, doc: Document) -> StoreResult<()>;

    /// Find the first document matching `filter`, honoring sort order.
    fn find_one(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Option<Document>>;

    /// Find all documents matching `filter`, honoring sort and limit.
    fn find(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>>;

    /// Update the first document matching `filter`. With `upsert`, inserts
    /// a document built from the filter's equality clauses and the update
    /// when nothing matches.
    fn update_one(&self, filter: &Filter, update: &Update, upsert: bool)
        -> StoreResult<UpdateOutcome>;

    /// Update every document matching `filter`; returns the matched count.
    fn update_many(&self, filter: &Filter, update: &Update) -> StoreResult<u64>;

    /// Delete the first document matching `filter`.
    fn delete_one(&self, filter: &Filter) -> StoreResult<bool>;

    /// Delete every document matching `filter`; returns the removed count.
    fn delete_many(&self, filter: &Filter) -> StoreResult<u64>;

    /// Count documents matching `filter`.
    fn count_documents(&self, filter: &Filter) -> StoreResult<u64>;

    /// Declare an index. Idempotent per index name.
    fn create_index(&self, spec: IndexSpec) -> StoreResult<()>;
}

/// Provider of named collection handles.
pub trait DocumentStore: Send + Sync {
    /// Get (or create) the collection with the given name.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;
}
