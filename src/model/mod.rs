//! # Chronicle Data Model
//!
//! Persisted record types for the four chronicle collections plus the
//! shared config collection. All records serialize with camelCase field
//! names; `ccType` travels as the integer 1 (full) or 2 (delta);
//! timestamps travel as microseconds since the epoch.
//!
//! A document collection `orders` owns:
//! - `orders_chronicle_chunks` - [`ChronicleChunk`] records
//! - `orders_chronicle_metadata` - [`ChronicleMetadata`], unique on `(docId, epoch)`
//! - `orders_chronicle_branches` - [`ChronicleBranch`] records
//! - `orders_chronicle_keys` - [`KeyRow`] records, unique on `(docId, branchId)`
//!
//! plus one row in the shared `chronicle_config` collection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::Document;

/// Document identifier (opaque, sortable)
pub type DocId = String;
/// Branch identifier (opaque, sortable)
pub type BranchId = String;
/// Chunk identifier (opaque, sortable)
pub type ChunkId = String;
/// Generation counter for reused document identities (>= 1)
pub type Epoch = u32;
/// Dense 1-based position of a chunk within its branch
pub type Serial = u64;

/// Name of the root branch created implicitly with a document.
pub const MAIN_BRANCH: &str = "main";

/// Name of the shared per-collection config collection.
pub const CONFIG_COLLECTION: &str = "chronicle_config";

/// Keys the host mirror owns; never stored inside chunk payloads.
pub const RESERVED_KEYS: &[&str] = &["_id", "__v", "__chronicle_deleted"];

/// True if `key` belongs to the host mirror rather than the user payload.
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Chunk collection name for a document collection.
pub fn chunks_collection(base: &str) -> String {
    format!("{base}_chronicle_chunks")
}

/// Metadata collection name for a document collection.
pub fn metadata_collection(base: &str) -> String {
    format!("{base}_chronicle_metadata")
}

/// Branch collection name for a document collection.
pub fn branches_collection(base: &str) -> String {
    format!("{base}_chronicle_branches")
}

/// Key-row collection name for a document collection.
pub fn keys_collection(base: &str) -> String {
    format!("{base}_chronicle_keys")
}

/// Kind of a chronicle chunk. Wire form: 1 = full, 2 = delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ChunkType {
    /// Complete document state at this serial
    Full,
    /// Forward patch against the preceding state
    Delta,
}

impl From<ChunkType> for u8 {
    fn from(value: ChunkType) -> Self {
        match value {
            ChunkType::Full => 1,
            ChunkType::Delta => 2,
        }
    }
}

impl TryFrom<u8> for ChunkType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ChunkType::Full),
            2 => Ok(ChunkType::Delta),
            other => Err(format!("invalid ccType {other}")),
        }
    }
}

/// One immutable entry in a document's append-only chronicle.
///
/// Chunks are only ever appended; they are removed solely by revert
/// (serials past the target), squash, and purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronicleChunk {
    pub chunk_id: ChunkId,
    pub doc_id: DocId,
    pub epoch: Epoch,
    pub branch_id: BranchId,
    /// Dense 1-based position within `(docId, epoch, branchId)`
    pub serial: Serial,
    pub cc_type: ChunkType,
    /// True on the deletion chunk written by soft delete
    pub is_deleted: bool,
    /// Exactly one chunk per `(docId, epoch, branchId)` carries this flag
    pub is_latest: bool,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub c_time: DateTime<Utc>,
    /// Full state (full chunks) or forward patch with null tombstones
    /// (delta chunks)
    pub payload: Document,
}

/// A named, parented timeline of a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronicleBranch {
    pub branch_id: BranchId,
    pub doc_id: DocId,
    pub epoch: Epoch,
    /// Branch this one diverged from; null on the epoch's root
    pub parent_branch_id: Option<BranchId>,
    /// Serial on the parent at which this branch diverged; null on the root
    pub parent_serial: Option<Serial>,
    pub name: String,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

impl ChronicleBranch {
    /// True for the root (`main`) branch of an epoch.
    pub fn is_root(&self) -> bool {
        self.parent_branch_id.is_none() && self.parent_serial.is_none()
    }
}

/// Lifecycle status of a `(docId, epoch)` chronicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataStatus {
    /// First save began but has not committed its chunk yet
    Pending,
    /// Chronicle is live
    Active,
    /// Lineage abandoned mid-create; eligible for cleanup
    Orphaned,
}

/// One row per `(docId, epoch)`: the active branch and lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronicleMetadata {
    pub doc_id: DocId,
    pub epoch: Epoch,
    /// Branch receiving new saves
    pub active_branch_id: BranchId,
    pub metadata_status: MetadataStatus,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Per `(docId, branchId)` record of the live values of declared unique
/// fields.
///
/// In memory the unique values are a map; at the storage boundary each
/// field `f` flattens to a `key_f` column so the backend's partial unique
/// index on `(key_f, branchId)` can enforce per-branch uniqueness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRow {
    pub doc_id: DocId,
    pub branch_id: BranchId,
    pub is_deleted: bool,
    pub keys: BTreeMap<String, Value>,
}

impl KeyRow {
    /// Build a key row from a payload, taking `null` for absent fields
    /// (sparse uniqueness: many nulls are allowed).
    pub fn from_payload(
        doc_id: impl Into<DocId>,
        branch_id: impl Into<BranchId>,
        unique_fields: &[String],
        payload: &Document,
        is_deleted: bool,
    ) -> Self {
        let keys = unique_fields
            .iter()
            .map(|field| {
                let value = payload.get(field).cloned().unwrap_or(Value::Null);
                (field.clone(), value)
            })
            .collect();
        Self {
            doc_id: doc_id.into(),
            branch_id: branch_id.into(),
            is_deleted,
            keys,
        }
    }

    /// Storage column for a unique field.
    pub fn column(field: &str) -> String {
        format!("key_{field}")
    }

    /// Flatten to the persisted column form.
    pub fn into_document(self) -> Document {
        let mut doc = Document::new();
        doc.insert("docId".to_string(), Value::String(self.doc_id));
        doc.insert("branchId".to_string(), Value::String(self.branch_id));
        doc.insert("isDeleted".to_string(), Value::Bool(self.is_deleted));
        for (field, value) in self.keys {
            doc.insert(Self::column(&field), value);
        }
        doc
    }
}

/// Per-collection chronicle configuration, one row in `chronicle_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronicleConfig {
    pub collection_name: String,
    /// Every Nth serial is written as a full chunk
    pub full_chunk_interval: u64,
    pub plugin_version: String,
    /// Payload fields with point-read access paths on latest live chunks
    pub indexed_fields: Vec<String>,
    /// Payload fields under per-branch unique enforcement
    pub unique_fields: Vec<String>,
}

/// Serialize a record into its stored document form.
pub(crate) fn to_document<T: Serialize>(record: &T) -> crate::backend::StoreResult<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(crate::backend::StoreError::Serialization(
            serde::ser::Error::custom(format!("expected object, got {other}")),
        )),
    }
}

/// Deserialize a stored document into a record, ignoring backend-private
/// fields such as `_id`.
pub(crate) fn from_document<T: serde::de::DeserializeOwned>(
    doc: Document,
) -> crate::backend::StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_type_wire_integers() {
        assert_eq!(serde_json::to_value(ChunkType::Full).unwrap(), json!(1));
        assert_eq!(serde_json::to_value(ChunkType::Delta).unwrap(), json!(2));
        assert_eq!(
            serde_json::from_value::<ChunkType>(json!(2)).unwrap(),
            ChunkType::Delta
        );
        assert!(serde_json::from_value::<ChunkType>(json!(3)).is_err());
    }

    #[test]
    fn test_chunk_wire_field_names() {
        let chunk = ChronicleChunk {
            chunk_id: "c1".to_string(),
            doc_id: "d1".to_string(),
            epoch: 1,
            branch_id: "b1".to_string(),
            serial: 1,
            cc_type: ChunkType::Full,
            is_deleted: false,
            is_latest: true,
            c_time: Utc::now(),
            payload: Document::new(),
        };
        let value = serde_json::to_value(&chunk).unwrap();
        for field in [
            "chunkId", "docId", "epoch", "branchId", "serial", "ccType", "isDeleted", "isLatest",
            "cTime", "payload",
        ] {
            assert!(value.get(field).is_some(), "missing wire field {field}");
        }
    }

    #[test]
    fn test_metadata_status_wire_form() {
        assert_eq!(
            serde_json::to_value(MetadataStatus::Pending).unwrap(),
            json!("pending")
        );
        assert_eq!(
            serde_json::to_value(MetadataStatus::Active).unwrap(),
            json!("active")
        );
    }

    #[test]
    fn test_key_row_flattens_to_columns() {
        let payload = json!({"email": "a@b", "other": 1})
            .as_object()
            .cloned()
            .unwrap();
        let row = KeyRow::from_payload(
            "d1",
            "b1",
            &["email".to_string(), "handle".to_string()],
            &payload,
            false,
        );
        let doc = row.into_document();
        assert_eq!(doc["key_email"], json!("a@b"));
        assert_eq!(doc["key_handle"], json!(null));
        assert_eq!(doc["isDeleted"], json!(false));
        assert!(!doc.contains_key("key_other"));
    }

    #[test]
    fn test_branch_root_detection() {
        let root = ChronicleBranch {
            branch_id: "b1".to_string(),
            doc_id: "d1".to_string(),
            epoch: 1,
            parent_branch_id: None,
            parent_serial: None,
            name: MAIN_BRANCH.to_string(),
            created_at: Utc::now(),
        };
        assert!(root.is_root());

        let child = ChronicleBranch {
            parent_branch_id: Some("b1".to_string()),
            parent_serial: Some(3),
            name: "feature".to_string(),
            ..root
        };
        assert!(!child.is_root());
    }
}
