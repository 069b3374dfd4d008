//! End-to-end chronicle scenarios
//!
//! Each test seeds one operation flow against the in-memory backend and
//! asserts the persisted chunk/branch/key shape plus the read-back state.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use chronicledb::backend::{Document, DocumentStore, Filter, FindOptions, MemoryStore};
use chronicledb::chunk::{Bound, ChunkStore};
use chronicledb::model::{chunks_collection, keys_collection, ChunkType};
use chronicledb::{
    AsOfOptions, Chronicle, ChronicleError, CreateBranchOptions, InitOptions, PurgeOptions,
    RevertOptions, SaveOutcome, SquashOptions, SquashOutcome, UndeleteOptions,
};

fn payload(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn setup(interval: u64, unique_fields: &[&str]) -> (MemoryStore, Chronicle) {
    let store = MemoryStore::new();
    let chronicle = Chronicle::initialize(
        &store,
        "orders",
        InitOptions {
            full_chunk_interval: interval,
            unique_fields: unique_fields.iter().map(|f| f.to_string()).collect(),
            ..InitOptions::default()
        },
    )
    .unwrap();
    (store, chronicle)
}

fn chunk_store(store: &MemoryStore) -> ChunkStore {
    ChunkStore::new(store.collection(&chunks_collection("orders")))
}

/// A probe instant safely past everything written so far.
fn latest() -> chrono::DateTime<Utc> {
    Utc::now() + Duration::minutes(5)
}

// =============================================================================
// Scenario: delta then full cadence
// =============================================================================

/// With interval 3, three saves produce FULL, DELTA, FULL at serials 1-3.
#[test]
fn test_delta_then_full_cadence() {
    let (store, chronicle) = setup(3, &[]);

    for n in 1..=3 {
        let outcome = chronicle.save("d1", &payload(json!({"a": n}))).unwrap();
        assert_eq!(outcome.serial(), n as u64);
    }

    let active = chronicle.get_active_branch("d1").unwrap().unwrap();
    let chunks = chunk_store(&store)
        .list_ordered("d1", 1, &active.branch_id, &Bound::Latest)
        .unwrap();

    assert_eq!(chunks.len(), 3);
    assert_eq!(
        chunks.iter().map(|c| c.cc_type).collect::<Vec<_>>(),
        vec![ChunkType::Full, ChunkType::Delta, ChunkType::Full]
    );
    assert_eq!(
        chunks.iter().map(|c| c.serial).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    for (chunk, n) in chunks.iter().zip(1..) {
        assert_eq!(Value::Object(chunk.payload.clone()), json!({"a": n}));
    }
    assert_eq!(
        chunks.iter().filter(|c| c.is_latest).map(|c| c.serial).collect::<Vec<_>>(),
        vec![3]
    );
}

/// Saving an identical payload appends nothing.
#[test]
fn test_unchanged_save_is_a_no_op() {
    let (store, chronicle) = setup(10, &[]);
    chronicle.save("d1", &payload(json!({"a": 1}))).unwrap();
    let outcome = chronicle.save("d1", &payload(json!({"a": 1}))).unwrap();

    assert!(matches!(outcome, SaveOutcome::Unchanged { serial: 1, .. }));
    let active = chronicle.get_active_branch("d1").unwrap().unwrap();
    let chunks = chunk_store(&store)
        .list_ordered("d1", 1, &active.branch_id, &Bound::Latest)
        .unwrap();
    assert_eq!(chunks.len(), 1);
}

// =============================================================================
// Scenario: soft delete then undelete preserves state
// =============================================================================

/// The deletion chunk carries the full pre-deletion state; undelete
/// restores it and re-occupies the key row.
#[test]
fn test_soft_delete_then_undelete_preserves_state() {
    let (store, chronicle) = setup(10, &["email"]);

    chronicle.save("d1", &payload(json!({"email": "x@y"}))).unwrap();
    chronicle
        .save("d1", &payload(json!({"email": "x@y", "n": "Updated"})))
        .unwrap();
    chronicle.soft_delete("d1").unwrap();

    let deleted = chronicle.list_deleted(&Default::default()).unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].doc_id, "d1");
    assert_eq!(
        Value::Object(deleted[0].final_state.clone()),
        json!({"email": "x@y", "n": "Updated"})
    );

    let restored = chronicle.undelete("d1", &UndeleteOptions::default()).unwrap();
    assert_eq!(
        Value::Object(restored.restored_state.clone()),
        json!({"email": "x@y", "n": "Updated"})
    );

    let read = chronicle.as_of("d1", latest(), &AsOfOptions::default()).unwrap();
    assert_eq!(
        Value::Object(read.state.unwrap()),
        json!({"email": "x@y", "n": "Updated"})
    );

    let key_row = store
        .collection(&keys_collection("orders"))
        .find_one(&Filter::new().eq("docId", "d1"), &FindOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(key_row["isDeleted"], json!(false));
    assert_eq!(key_row["key_email"], json!("x@y"));
}

/// Deleting twice or undeleting a live document are lifecycle errors.
#[test]
fn test_lifecycle_preconditions() {
    let (_store, chronicle) = setup(10, &[]);
    chronicle.save("d1", &payload(json!({"a": 1}))).unwrap();

    let err = chronicle.undelete("d1", &UndeleteOptions::default()).unwrap_err();
    assert!(matches!(err, ChronicleError::NotDeleted(_)));

    chronicle.soft_delete("d1").unwrap();
    let err = chronicle.soft_delete("d1").unwrap_err();
    assert!(matches!(err, ChronicleError::AlreadyDeleted(_)));
}

// =============================================================================
// Scenario: unique released by soft delete
// =============================================================================

/// A soft delete frees the unique slot for another document on the branch.
#[test]
fn test_unique_released_by_soft_delete() {
    let (_store, chronicle) = setup(10, &["email"]);

    chronicle.save("docA", &payload(json!({"email": "a@b"}))).unwrap();

    let err = chronicle
        .save("docB", &payload(json!({"email": "a@b"})))
        .unwrap_err();
    assert!(matches!(
        err,
        ChronicleError::UniqueConstraintViolation { ref field, .. } if field == "email"
    ));

    chronicle.soft_delete("docA").unwrap();
    chronicle.save("docB", &payload(json!({"email": "a@b"}))).unwrap();

    // And the slot is now held by docB: docA cannot come back unchanged.
    let err = chronicle
        .undelete("docA", &UndeleteOptions::default())
        .unwrap_err();
    assert!(matches!(err, ChronicleError::UniqueConstraintViolation { .. }));
}

// =============================================================================
// Scenario: branch divergence
// =============================================================================

/// Two branches hold independent states of the same document.
#[test]
fn test_branch_divergence() {
    let (_store, chronicle) = setup(10, &[]);

    chronicle.save("d1", &payload(json!({"v": 1}))).unwrap();
    let main = chronicle.get_active_branch("d1").unwrap().unwrap();

    let feat = chronicle
        .create_branch(
            "d1",
            "feat",
            &CreateBranchOptions {
                activate: true,
                ..Default::default()
            },
        )
        .unwrap();
    chronicle.save("d1", &payload(json!({"v": 100}))).unwrap();

    let on_main = chronicle
        .as_of(
            "d1",
            latest(),
            &AsOfOptions {
                branch_id: Some(main.branch_id.clone()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(on_main.state.unwrap()["v"], json!(1));

    let on_feat = chronicle
        .as_of(
            "d1",
            latest(),
            &AsOfOptions {
                branch_id: Some(feat.branch_id.clone()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(on_feat.state.unwrap()["v"], json!(100));
    assert_eq!(on_feat.serial.unwrap(), 2);
}

// =============================================================================
// Scenario: revert updates orphaned children
// =============================================================================

/// Reverting past a child's divergence point pulls its parent serial back.
#[test]
fn test_revert_updates_orphan_children() {
    let (store, chronicle) = setup(10, &[]);

    for v in 1..=3 {
        chronicle.save("d1", &payload(json!({"v": v}))).unwrap();
    }
    let child = chronicle
        .create_branch(
            "d1",
            "child",
            &CreateBranchOptions {
                from_serial: Some(3),
                activate: false,
            },
        )
        .unwrap();
    chronicle.save("d1", &payload(json!({"v": 4}))).unwrap();

    let result = chronicle
        .revert("d1", 2, &RevertOptions { rehydrate: true, ..Default::default() })
        .unwrap();
    assert_eq!(result.chunks_removed, 2);
    assert_eq!(result.branches_updated, 1);
    assert_eq!(result.state.unwrap()["v"], json!(2));

    let branches = chronicle.list_branches("d1").unwrap();
    let child_now = branches
        .iter()
        .find(|b| b.branch_id == child.branch_id)
        .unwrap();
    assert_eq!(child_now.parent_serial, Some(2));

    // The child's own lineage is untouched: its serial-1 full chunk still
    // rehydrates to the state it branched with.
    let child_chunks = chunk_store(&store)
        .list_ordered("d1", 1, &child.branch_id, &Bound::Latest)
        .unwrap();
    assert_eq!(child_chunks.len(), 1);
    assert_eq!(child_chunks[0].cc_type, ChunkType::Full);
    assert_eq!(child_chunks[0].payload["v"], json!(3));
}

/// Reverting to the latest serial is a no-op.
#[test]
fn test_revert_to_latest_is_noop() {
    let (_store, chronicle) = setup(10, &[]);
    chronicle.save("d1", &payload(json!({"v": 1}))).unwrap();
    chronicle.save("d1", &payload(json!({"v": 2}))).unwrap();

    let result = chronicle.revert("d1", 2, &RevertOptions::default()).unwrap();
    assert_eq!(result.chunks_removed, 0);
    assert_eq!(result.branches_updated, 0);
    assert_eq!(result.reverted_to_serial, 2);
}

/// Reverting to a serial that never existed fails.
#[test]
fn test_revert_to_missing_serial_fails() {
    let (_store, chronicle) = setup(10, &[]);
    chronicle.save("d1", &payload(json!({"v": 1}))).unwrap();

    let err = chronicle.revert("d1", 9, &RevertOptions::default()).unwrap_err();
    assert!(matches!(err, ChronicleError::SerialNotFound { serial: 9, .. }));
}

// =============================================================================
// Scenario: squash collapses lineage
// =============================================================================

/// Squash leaves exactly one branch and one full chunk carrying the state
/// at the target serial.
#[test]
fn test_squash_collapses_lineage() {
    let (store, chronicle) = setup(10, &[]);

    for v in 1..=3 {
        chronicle.save("d1", &payload(json!({"v": v}))).unwrap();
    }
    chronicle
        .create_branch("d1", "side", &CreateBranchOptions::default())
        .unwrap();

    let outcome = chronicle
        .squash(
            "d1",
            3,
            &SquashOptions {
                confirm: true,
                ..Default::default()
            },
        )
        .unwrap();
    let SquashOutcome::Applied {
        new_branch_id,
        chunks_removed,
        branches_removed,
        new_base_state,
        ..
    } = outcome
    else {
        panic!("expected an applied squash");
    };
    assert_eq!(chunks_removed, 4);
    assert_eq!(branches_removed, 2);
    assert_eq!(new_base_state["v"], json!(3));

    let branches = chronicle.list_branches("d1").unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].name, "main");
    assert_eq!(branches[0].branch_id, new_branch_id);
    assert!(branches[0].is_root());

    let active = chronicle.get_active_branch("d1").unwrap().unwrap();
    assert_eq!(active.branch_id, new_branch_id);

    let chunks = chunk_store(&store)
        .list_ordered("d1", 1, &new_branch_id, &Bound::Latest)
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].serial, 1);
    assert_eq!(chunks[0].cc_type, ChunkType::Full);

    let read = chronicle.as_of("d1", latest(), &AsOfOptions::default()).unwrap();
    assert_eq!(read.state.unwrap()["v"], json!(3));
}

/// A dry run reports the would-be removal without changing anything.
#[test]
fn test_squash_dry_run_changes_nothing() {
    let (_store, chronicle) = setup(10, &[]);
    for v in 1..=3 {
        chronicle.save("d1", &payload(json!({"v": v}))).unwrap();
    }
    chronicle
        .create_branch("d1", "side", &CreateBranchOptions::default())
        .unwrap();

    let outcome = chronicle
        .squash(
            "d1",
            2,
            &SquashOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();
    let SquashOutcome::DryRun(dry_run) = outcome else {
        panic!("expected a dry run");
    };
    assert_eq!(dry_run.would_delete_chunks, 4);
    assert_eq!(dry_run.would_delete_branches, 1);
    assert_eq!(dry_run.new_base_state["v"], json!(2));

    assert_eq!(chronicle.list_branches("d1").unwrap().len(), 2);
}

/// Destructive operations demand confirmation.
#[test]
fn test_destructive_operations_require_confirmation() {
    let (_store, chronicle) = setup(10, &[]);
    chronicle.save("d1", &payload(json!({"v": 1}))).unwrap();

    let err = chronicle
        .squash("d1", 1, &SquashOptions::default())
        .unwrap_err();
    assert!(matches!(err, ChronicleError::ConfirmationRequired { .. }));

    let err = chronicle.purge("d1", &PurgeOptions::default()).unwrap_err();
    assert!(matches!(err, ChronicleError::ConfirmationRequired { .. }));
}

// =============================================================================
// Scenario: purge removes the lineage
// =============================================================================

/// After a full purge, the same id starts over at epoch 1.
#[test]
fn test_purge_then_recreate_starts_fresh() {
    let (store, chronicle) = setup(10, &["email"]);

    chronicle.save("d1", &payload(json!({"email": "a@b", "v": 1}))).unwrap();
    chronicle.save("d1", &payload(json!({"email": "a@b", "v": 2}))).unwrap();

    let result = chronicle
        .purge("d1", &PurgeOptions { confirm: true, epoch: None })
        .unwrap();
    assert_eq!(result.epochs_purged, 1);
    assert_eq!(result.chunks_removed, 2);
    assert_eq!(result.branches_removed, 1);

    assert!(chronicle.get_active_branch("d1").unwrap().is_none());
    assert_eq!(
        store
            .collection(&keys_collection("orders"))
            .count_documents(&Filter::new().eq("docId", "d1"))
            .unwrap(),
        0
    );

    // Reuse of the id begins a fresh lineage; the unique value is free.
    let outcome = chronicle.save("d1", &payload(json!({"email": "a@b"}))).unwrap();
    assert_eq!(outcome.serial(), 1);
    let branches = chronicle.list_branches("d1").unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].epoch, 1);
}

/// Purging a document that does not exist is an error.
#[test]
fn test_purge_missing_document_fails() {
    let (_store, chronicle) = setup(10, &[]);
    let err = chronicle
        .purge("ghost", &PurgeOptions { confirm: true, epoch: None })
        .unwrap_err();
    assert!(matches!(err, ChronicleError::NotFound(_)));
}
