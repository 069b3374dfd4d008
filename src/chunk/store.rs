//! Typed operations over a `{collection}_chronicle_chunks` collection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::backend::{
    Collection, Filter, FindOptions, IndexSpec, SortOrder, StoreError, StoreResult, Update,
};
use crate::model::{self, ChronicleChunk, Epoch, Serial};

/// Name of the unique coordinate index; a duplicate-key error on it means
/// a concurrent save won the serial.
pub const SERIAL_CONFLICT_INDEX: &str = "chunk_coord_unique";

/// Scan bound for ordered chunk reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// All chunks of the group
    Latest,
    /// Chunks with `serial <= n`
    Serial(Serial),
    /// Chunks with `cTime <= t`
    Time(DateTime<Utc>),
}

/// Handle on one chunk collection.
#[derive(Clone)]
pub struct ChunkStore {
    coll: Arc<dyn Collection>,
}

impl ChunkStore {
    pub fn new(coll: Arc<dyn Collection>) -> Self {
        Self { coll }
    }

    /// Declare the chunk indexes, including one partial access path per
    /// declared indexed payload field.
    pub fn ensure_indexes(&self, indexed_fields: &[String]) -> StoreResult<()> {
        self.coll.create_index(
            IndexSpec::new(SERIAL_CONFLICT_INDEX)
                .key("docId", SortOrder::Asc)
                .key("epoch", SortOrder::Asc)
                .key("branchId", SortOrder::Asc)
                .key("serial", SortOrder::Desc)
                .unique(),
        )?;
        self.coll.create_index(
            IndexSpec::new("chunk_latest")
                .key("docId", SortOrder::Asc)
                .key("epoch", SortOrder::Asc)
                .key("branchId", SortOrder::Asc)
                .partial(Filter::new().eq("isLatest", true)),
        )?;
        self.coll.create_index(
            IndexSpec::new("chunk_branch_time")
                .key("branchId", SortOrder::Asc)
                .key("cTime", SortOrder::Desc),
        )?;
        self.coll.create_index(
            IndexSpec::new("chunk_latest_deleted")
                .key("cTime", SortOrder::Desc)
                .partial(Filter::new().eq("isLatest", true).eq("isDeleted", true)),
        )?;
        for field in indexed_fields {
            self.coll.create_index(
                IndexSpec::new(format!("chunk_payload_{field}"))
                    .key(format!("payload.{field}"), SortOrder::Asc)
                    .key("branchId", SortOrder::Asc)
                    .partial(Filter::new().eq("isLatest", true).eq("isDeleted", false)),
            )?;
        }
        Ok(())
    }

    fn group_filter(doc_id: &str, epoch: Epoch, branch_id: &str) -> Filter {
        Filter::new()
            .eq("docId", doc_id)
            .eq("epoch", epoch)
            .eq("branchId", branch_id)
    }

    /// Append a chunk and make it the group's latest.
    ///
    /// The previous latest flag is cleared first; the insert itself is the
    /// conditional step, rejected by the coordinate index when another
    /// writer claimed the serial in between.
    pub fn append(&self, chunk: &ChronicleChunk) -> StoreResult<()> {
        self.clear_latest(&chunk.doc_id, chunk.epoch, &chunk.branch_id)?;
        self.coll.insert_one(model::to_document(chunk)?)?;
        debug!(
            doc_id = %chunk.doc_id,
            branch_id = %chunk.branch_id,
            serial = chunk.serial,
            cc_type = u8::from(chunk.cc_type),
            is_deleted = chunk.is_deleted,
            "appended chunk"
        );
        Ok(())
    }

    /// Clear the latest flag on whichever chunk of the group carries it.
    pub fn clear_latest(&self, doc_id: &str, epoch: Epoch, branch_id: &str) -> StoreResult<u64> {
        self.coll.update_many(
            &Self::group_filter(doc_id, epoch, branch_id).eq("isLatest", true),
            &Update::new().set("isLatest", false),
        )
    }

    /// Mark the chunk at `serial` as the group's latest.
    pub fn set_latest(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
        serial: Serial,
    ) -> StoreResult<()> {
        self.clear_latest(doc_id, epoch, branch_id)?;
        self.coll.update_one(
            &Self::group_filter(doc_id, epoch, branch_id).eq("serial", serial),
            &Update::new().set("isLatest", true),
            false,
        )?;
        Ok(())
    }

    /// The group's latest chunk. Prefers the highest serial, which keeps
    /// reads correct during the clear/append overlap window.
    pub fn find_latest(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
    ) -> StoreResult<Option<ChronicleChunk>> {
        let doc = self.coll.find_one(
            &Self::group_filter(doc_id, epoch, branch_id).eq("isLatest", true),
            &FindOptions::new().sort_desc("serial"),
        )?;
        doc.map(model::from_document).transpose()
    }

    /// The chunk at an exact serial.
    pub fn find_by_serial(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
        serial: Serial,
    ) -> StoreResult<Option<ChronicleChunk>> {
        let doc = self.coll.find_one(
            &Self::group_filter(doc_id, epoch, branch_id).eq("serial", serial),
            &FindOptions::new(),
        )?;
        doc.map(model::from_document).transpose()
    }

    /// All chunks of the group within `bound`, sorted by serial ascending.
    pub fn list_ordered(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
        bound: &Bound,
    ) -> StoreResult<Vec<ChronicleChunk>> {
        let mut filter = Self::group_filter(doc_id, epoch, branch_id);
        match bound {
            Bound::Latest => {}
            Bound::Serial(serial) => filter = filter.lte("serial", *serial),
            Bound::Time(instant) => filter = filter.lte("cTime", instant.timestamp_micros()),
        }
        let docs = self
            .coll
            .find(&filter, &FindOptions::new().sort_asc("serial"))?;
        docs.into_iter().map(model::from_document).collect()
    }

    /// The most recent chunk of the group at or before `instant`.
    pub fn latest_at_time(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
        instant: DateTime<Utc>,
    ) -> StoreResult<Option<ChronicleChunk>> {
        let doc = self.coll.find_one(
            &Self::group_filter(doc_id, epoch, branch_id)
                .lte("cTime", instant.timestamp_micros()),
            &FindOptions::new().sort_desc("cTime").sort_desc("serial"),
        )?;
        doc.map(model::from_document).transpose()
    }

    /// Delete chunks of the group with `serial > after`; returns the count.
    pub fn delete_after(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
        after: Serial,
    ) -> StoreResult<u64> {
        self.coll
            .delete_many(&Self::group_filter(doc_id, epoch, branch_id).gt("serial", after))
    }

    /// Cascade-delete all chunks of a document, optionally one epoch only.
    pub fn delete_all(&self, doc_id: &str, epoch: Option<Epoch>) -> StoreResult<u64> {
        let mut filter = Filter::new().eq("docId", doc_id);
        if let Some(epoch) = epoch {
            filter = filter.eq("epoch", epoch);
        }
        self.coll.delete_many(&filter)
    }

    /// Count all chunks of a document, optionally one epoch only.
    pub fn count(&self, doc_id: &str, epoch: Option<Epoch>) -> StoreResult<u64> {
        let mut filter = Filter::new().eq("docId", doc_id);
        if let Some(epoch) = epoch {
            filter = filter.eq("epoch", epoch);
        }
        self.coll.count_documents(&filter)
    }

    /// Latest-and-deleted chunks across the collection, newest first,
    /// optionally restricted to a deletion-time window.
    pub fn list_latest_deleted(
        &self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<ChronicleChunk>> {
        let mut filter = Filter::new().eq("isLatest", true).eq("isDeleted", true);
        if let Some(after) = after {
            filter = filter.gte("cTime", after.timestamp_micros());
        }
        if let Some(before) = before {
            filter = filter.lte("cTime", before.timestamp_micros());
        }
        let docs = self
            .coll
            .find(&filter, &FindOptions::new().sort_desc("cTime"))?;
        docs.into_iter().map(model::from_document).collect()
    }
}

/// True if the error is a lost race on the chunk coordinate index.
pub(crate) fn is_serial_conflict(err: &StoreError) -> bool {
    matches!(err, StoreError::DuplicateKey { index, .. } if index == SERIAL_CONFLICT_INDEX)
}
