//! Typed operations over a `{collection}_chronicle_metadata` collection.
//!
//! One row per `(docId, epoch)`. The `pending` status marks a first save
//! whose chunk has not committed yet; the activation to `active` is the
//! last store write of a save so interrupted creates stay identifiable.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backend::{
    Collection, Filter, FindOptions, IndexSpec, SortOrder, StoreResult, Update,
};
use crate::model::{self, ChronicleMetadata, Epoch, MetadataStatus};

/// Name of the unique `(docId, epoch)` index; a duplicate-key error on it
/// means a concurrent save created the lineage first.
pub const DOC_EPOCH_INDEX: &str = "metadata_doc_epoch_unique";

/// Handle on one metadata collection.
#[derive(Clone)]
pub struct MetadataStore {
    coll: Arc<dyn Collection>,
}

impl MetadataStore {
    pub fn new(coll: Arc<dyn Collection>) -> Self {
        Self { coll }
    }

    pub fn ensure_indexes(&self) -> StoreResult<()> {
        self.coll.create_index(
            IndexSpec::new(DOC_EPOCH_INDEX)
                .key("docId", SortOrder::Asc)
                .key("epoch", SortOrder::Asc)
                .unique(),
        )
    }

    /// The metadata row of the document's highest epoch.
    pub fn latest_epoch(&self, doc_id: &str) -> StoreResult<Option<ChronicleMetadata>> {
        let doc = self.coll.find_one(
            &Filter::new().eq("docId", doc_id),
            &FindOptions::new().sort_desc("epoch"),
        )?;
        doc.map(model::from_document).transpose()
    }

    /// The metadata row of a specific epoch.
    pub fn find(&self, doc_id: &str, epoch: Epoch) -> StoreResult<Option<ChronicleMetadata>> {
        let doc = self.coll.find_one(
            &Filter::new().eq("docId", doc_id).eq("epoch", epoch),
            &FindOptions::new(),
        )?;
        doc.map(model::from_document).transpose()
    }

    /// All metadata rows of a document, optionally one epoch only.
    pub fn list(&self, doc_id: &str, epoch: Option<Epoch>) -> StoreResult<Vec<ChronicleMetadata>> {
        let mut filter = Filter::new().eq("docId", doc_id);
        if let Some(epoch) = epoch {
            filter = filter.eq("epoch", epoch);
        }
        let docs = self
            .coll
            .find(&filter, &FindOptions::new().sort_asc("epoch"))?;
        docs.into_iter().map(model::from_document).collect()
    }

    /// Insert the `pending` row that precedes a lineage's first chunk.
    pub fn insert_pending(
        &self,
        doc_id: &str,
        epoch: Epoch,
        active_branch_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let row = ChronicleMetadata {
            doc_id: doc_id.to_string(),
            epoch,
            active_branch_id: active_branch_id.to_string(),
            metadata_status: MetadataStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.coll.insert_one(model::to_document(&row)?)
    }

    /// Mark the lineage live. The finalization write of every save.
    pub fn set_active(&self, doc_id: &str, epoch: Epoch, now: DateTime<Utc>) -> StoreResult<()> {
        self.coll.update_one(
            &Filter::new().eq("docId", doc_id).eq("epoch", epoch),
            &Update::new()
                .set("metadataStatus", "active")
                .set("updatedAt", now.timestamp_micros()),
            false,
        )?;
        Ok(())
    }

    /// Point saves at a different branch.
    pub fn set_active_branch(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.coll.update_one(
            &Filter::new().eq("docId", doc_id).eq("epoch", epoch),
            &Update::new()
                .set("activeBranchId", branch_id)
                .set("updatedAt", now.timestamp_micros()),
            false,
        )?;
        Ok(())
    }

    /// Replace every metadata row of the document with a fresh epoch-1
    /// `active` row pointing at `new_branch_id`. Used by squash.
    pub fn reset_to_epoch_one(
        &self,
        doc_id: &str,
        new_branch_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.coll
            .delete_many(&Filter::new().eq("docId", doc_id))?;
        let row = ChronicleMetadata {
            doc_id: doc_id.to_string(),
            epoch: 1,
            active_branch_id: new_branch_id.to_string(),
            metadata_status: MetadataStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.coll.insert_one(model::to_document(&row)?)
    }

    /// Cascade-delete the metadata of a document, optionally one epoch only.
    pub fn delete_all(&self, doc_id: &str, epoch: Option<Epoch>) -> StoreResult<u64> {
        let mut filter = Filter::new().eq("docId", doc_id);
        if let Some(epoch) = epoch {
            filter = filter.eq("epoch", epoch);
        }
        self.coll.delete_many(&filter)
    }
}
