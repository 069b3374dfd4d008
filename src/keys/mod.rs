//! # Key Index
//!
//! History-aware unique enforcement. One row per `(docId, branchId)`
//! carries the current values of every declared unique field; a partial
//! unique index per field on `(key_f, branchId)` - filtered to live,
//! non-null rows - is the authoritative constraint. The `validate`
//! pre-check exists to produce clean errors cheaply before any chunk is
//! written; a race that slips past it is still caught by the index and
//! normalized to the same error.
//!
//! Soft delete flips the row's `isDeleted` flag, which releases the
//! document's unique slots on that branch without touching other
//! branches.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::backend::{
    Collection, Document, Filter, FindOptions, IndexSpec, SortOrder, StoreError, StoreResult,
    Update,
};
use crate::error::{ChronicleError, ChronicleResult};
use crate::model::KeyRow;

/// Handle on one `{collection}_chronicle_keys` collection.
#[derive(Clone)]
pub struct KeyIndex {
    coll: Arc<dyn Collection>,
    unique_fields: Vec<String>,
}

impl KeyIndex {
    pub fn new(coll: Arc<dyn Collection>, unique_fields: Vec<String>) -> Self {
        Self {
            coll,
            unique_fields,
        }
    }

    /// The declared unique fields.
    pub fn unique_fields(&self) -> &[String] {
        &self.unique_fields
    }

    /// Declare the row identity index and one partial unique index per
    /// declared field.
    pub fn ensure_indexes(&self) -> StoreResult<()> {
        self.coll.create_index(
            IndexSpec::new("key_row_identity")
                .key("docId", SortOrder::Asc)
                .key("branchId", SortOrder::Asc)
                .unique(),
        )?;
        for field in &self.unique_fields {
            let column = KeyRow::column(field);
            self.coll.create_index(
                IndexSpec::new(format!("{column}_per_branch"))
                    .key(column.clone(), SortOrder::Asc)
                    .key("branchId", SortOrder::Asc)
                    .unique()
                    .partial(Filter::new().eq("isDeleted", false).ne(column, Value::Null)),
            )?;
        }
        Ok(())
    }

    /// Check that `payload` takes no unique value already held by a live
    /// document on `branch_id`. Null or absent values are skipped (sparse
    /// uniqueness).
    pub fn validate(
        &self,
        payload: &Document,
        branch_id: &str,
        exclude_doc_id: Option<&str>,
    ) -> ChronicleResult<()> {
        for field in &self.unique_fields {
            let Some(value) = payload.get(field) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let mut filter = Filter::new()
                .eq(KeyRow::column(field), value.clone())
                .eq("branchId", branch_id)
                .eq("isDeleted", false);
            if let Some(doc_id) = exclude_doc_id {
                filter = filter.ne("docId", doc_id);
            }
            if self.coll.find_one(&filter, &FindOptions::new())?.is_some() {
                return Err(ChronicleError::UniqueConstraintViolation {
                    field: field.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Upsert the row for `(doc_id, branch_id)` from `payload`.
    pub fn upsert(
        &self,
        doc_id: &str,
        branch_id: &str,
        payload: &Document,
        is_deleted: bool,
    ) -> ChronicleResult<()> {
        let row = KeyRow::from_payload(doc_id, branch_id, &self.unique_fields, payload, is_deleted);
        let mut update = Update::new().set("isDeleted", row.is_deleted);
        for (field, value) in &row.keys {
            update = update.set(KeyRow::column(field), value.clone());
        }
        let filter = Filter::new().eq("docId", doc_id).eq("branchId", branch_id);
        self.coll
            .update_one(&filter, &update, true)
            .map_err(normalize_duplicate)?;
        Ok(())
    }

    /// Release the document's unique slots on `branch_id`.
    pub fn mark_deleted(&self, doc_id: &str, branch_id: &str) -> StoreResult<bool> {
        let outcome = self.coll.update_one(
            &Filter::new().eq("docId", doc_id).eq("branchId", branch_id),
            &Update::new().set("isDeleted", true),
            false,
        )?;
        debug!(doc_id = %doc_id, branch_id = %branch_id, "released unique slots");
        Ok(outcome.matched > 0)
    }

    /// Re-occupy the slots after an undelete, refreshing the key values.
    pub fn clear_deleted(
        &self,
        doc_id: &str,
        branch_id: &str,
        payload: &Document,
    ) -> ChronicleResult<()> {
        self.upsert(doc_id, branch_id, payload, false)
    }

    /// Remove every key row of a document.
    pub fn delete_for_doc(&self, doc_id: &str) -> StoreResult<u64> {
        self.coll.delete_many(&Filter::new().eq("docId", doc_id))
    }

    /// Remove the key rows of a document on the given branches only.
    pub fn delete_for_branches(&self, doc_id: &str, branch_ids: &[String]) -> StoreResult<u64> {
        if branch_ids.is_empty() {
            return Ok(0);
        }
        let ids = branch_ids
            .iter()
            .map(|id| Value::String(id.clone()))
            .collect();
        self.coll
            .delete_many(&Filter::new().eq("docId", doc_id).is_in("branchId", ids))
    }
}

/// Map a backend duplicate-key error on a `key_f` column to the
/// engine-level unique-constraint error.
fn normalize_duplicate(err: StoreError) -> ChronicleError {
    match err {
        StoreError::DuplicateKey {
            ref field,
            ref value,
            ..
        } => match field.strip_prefix("key_") {
            Some(user_field) => ChronicleError::UniqueConstraintViolation {
                field: user_field.to_string(),
                value: value.clone(),
            },
            None => ChronicleError::Storage(err),
        },
        other => ChronicleError::Storage(other),
    }
}
