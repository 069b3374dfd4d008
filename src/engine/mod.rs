//! # Operation Engine
//!
//! The public chronicle surface. [`Chronicle`] binds the chunk store,
//! branch/metadata stores, and key index for one document collection and
//! exposes the operations: `save`, `soft_delete`, `undelete`, `as_of`,
//! `revert`, `squash`, `purge`, `list_deleted`, and the branch
//! operations.
//!
//! Every operation either fully completes or raises; the only partial
//! states left behind by an interruption are an inserted branch or a
//! `pending` metadata row, neither of which violates the chunk
//! invariants.

mod as_of;
mod branches;
mod lifecycle;
mod revert;
mod save;
mod squash;

pub use as_of::{AsOfOptions, AsOfResult};
pub use branches::CreateBranchOptions;
pub use lifecycle::{
    DeletedDocument, DeletedFilter, SoftDeleteResult, UndeleteOptions, UndeleteResult,
};
pub use revert::{RevertOptions, RevertResult};
pub use save::SaveOutcome;
pub use squash::{PurgeOptions, PurgeResult, SquashDryRun, SquashOptions, SquashOutcome};

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::backend::{
    Clock, Collection, Document, DocumentStore, Filter, IdFactory, IndexSpec, SortOrder,
    SystemClock, Update, UuidFactory,
};
use crate::branch::{BranchStore, MetadataStore};
use crate::chunk::ChunkStore;
use crate::error::{ChronicleError, ChronicleResult};
use crate::keys::KeyIndex;
use crate::model::{
    self, ChronicleBranch, ChronicleChunk, ChronicleConfig, ChronicleMetadata, ChunkType, Epoch,
    Serial,
};

/// Every Nth serial is written as a full chunk unless configured otherwise.
pub const DEFAULT_FULL_CHUNK_INTERVAL: u64 = 10;

/// Configuration for [`Chronicle::initialize`].
pub struct InitOptions {
    /// Full-chunk cadence; minimum 1 (every chunk full)
    pub full_chunk_interval: u64,
    /// Payload fields given point-read access paths on latest live chunks
    pub indexed_fields: Vec<String>,
    /// Payload fields under per-branch unique enforcement
    pub unique_fields: Vec<String>,
    /// Identifier factory; defaults to sortable UUIDv7
    pub id_factory: Option<Arc<dyn IdFactory>>,
    /// Timestamp source; defaults to the monotonic system clock
    pub clock: Option<Arc<dyn Clock>>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            full_chunk_interval: DEFAULT_FULL_CHUNK_INTERVAL,
            indexed_fields: Vec::new(),
            unique_fields: Vec::new(),
            id_factory: None,
            clock: None,
        }
    }
}

/// The chronicle engine for one document collection.
pub struct Chronicle {
    config: ChronicleConfig,
    chunks: ChunkStore,
    branches: BranchStore,
    metadata: MetadataStore,
    keys: KeyIndex,
    ids: Arc<dyn IdFactory>,
    clock: Arc<dyn Clock>,
}

impl Chronicle {
    /// Ensure the chronicle collections, indexes, and config row exist for
    /// `collection`, and return the engine handle. Idempotent; re-running
    /// with changed options refreshes the config row.
    pub fn initialize(
        store: &dyn DocumentStore,
        collection: &str,
        options: InitOptions,
    ) -> ChronicleResult<Chronicle> {
        let mut interval = options.full_chunk_interval;
        if interval == 0 {
            warn!(collection, "full_chunk_interval 0 clamped to 1");
            interval = 1;
        }

        let config = ChronicleConfig {
            collection_name: collection.to_string(),
            full_chunk_interval: interval,
            plugin_version: env!("CARGO_PKG_VERSION").to_string(),
            indexed_fields: options.indexed_fields,
            unique_fields: options.unique_fields,
        };

        let config_coll = store.collection(model::CONFIG_COLLECTION);
        upsert_config(config_coll.as_ref(), &config)?;

        let chunks = ChunkStore::new(store.collection(&model::chunks_collection(collection)));
        chunks.ensure_indexes(&config.indexed_fields)?;

        let branches = BranchStore::new(store.collection(&model::branches_collection(collection)));
        branches.ensure_indexes()?;

        let metadata = MetadataStore::new(store.collection(&model::metadata_collection(collection)));
        metadata.ensure_indexes()?;

        let keys = KeyIndex::new(
            store.collection(&model::keys_collection(collection)),
            config.unique_fields.clone(),
        );
        keys.ensure_indexes()?;

        Ok(Chronicle {
            config,
            chunks,
            branches,
            metadata,
            keys,
            ids: options.id_factory.unwrap_or_else(|| Arc::new(UuidFactory)),
            clock: options.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    /// Metadata of the document's highest epoch, or `NotFound`.
    pub(crate) fn require_metadata(&self, doc_id: &str) -> ChronicleResult<ChronicleMetadata> {
        self.metadata
            .latest_epoch(doc_id)?
            .ok_or_else(|| ChronicleError::NotFound(format!("document {doc_id} has no chronicle")))
    }

    /// Resolve the branch an operation targets: the given branch (which
    /// must belong to the document's epoch) or the active one.
    pub(crate) fn resolve_branch(
        &self,
        meta: &ChronicleMetadata,
        branch_id: Option<&str>,
    ) -> ChronicleResult<ChronicleBranch> {
        let target = branch_id.unwrap_or(&meta.active_branch_id);
        self.branches
            .find(&meta.doc_id, meta.epoch, target)?
            .ok_or_else(|| ChronicleError::BranchNotFound {
                doc_id: meta.doc_id.clone(),
                branch_id: target.to_string(),
            })
    }

    /// Build a chunk with a fresh id and timestamp.
    pub(crate) fn new_chunk(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
        serial: Serial,
        cc_type: ChunkType,
        is_deleted: bool,
        payload: Document,
    ) -> ChronicleChunk {
        ChronicleChunk {
            chunk_id: self.ids.next_id(),
            doc_id: doc_id.to_string(),
            epoch,
            branch_id: branch_id.to_string(),
            serial,
            cc_type,
            is_deleted,
            is_latest: true,
            c_time: self.clock.now(),
            payload,
        }
    }
}

/// Strip reserved host keys and tombstone values from an incoming payload.
pub(crate) fn sanitize_payload(payload: &Document) -> Document {
    payload
        .iter()
        .filter(|(key, value)| !model::is_reserved_key(key) && !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn upsert_config(coll: &dyn Collection, config: &ChronicleConfig) -> ChronicleResult<()> {
    coll.create_index(
        IndexSpec::new("config_collection_unique")
            .key("collectionName", SortOrder::Asc)
            .unique(),
    )?;
    coll.update_one(
        &Filter::new().eq("collectionName", config.collection_name.clone()),
        &Update::new()
            .set("fullChunkInterval", config.full_chunk_interval)
            .set("pluginVersion", config.plugin_version.clone())
            .set(
                "indexedFields",
                Value::Array(
                    config
                        .indexed_fields
                        .iter()
                        .map(|f| Value::String(f.clone()))
                        .collect(),
                ),
            )
            .set(
                "uniqueFields",
                Value::Array(
                    config
                        .unique_fields
                        .iter()
                        .map(|f| Value::String(f.clone()))
                        .collect(),
                ),
            ),
        true,
    )?;
    Ok(())
}
