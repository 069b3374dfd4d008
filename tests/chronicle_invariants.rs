//! Chronicle invariant tests
//!
//! Property-based checks of the structural invariants: dense serials,
//! single latest flag, rehydration defined at every bound, delta
//! idempotence, save/revert round-trips, per-branch uniqueness, and
//! squash closure.

use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::{json, Value};

use chronicledb::backend::{Document, DocumentStore, MemoryStore};
use chronicledb::chunk::{Bound, ChunkStore};
use chronicledb::delta;
use chronicledb::model::{chunks_collection, ChunkType, Serial};
use chronicledb::rehydrate::rehydrate;
use chronicledb::{
    AsOfOptions, Chronicle, ChronicleError, CreateBranchOptions, InitOptions, RevertOptions,
    SquashOptions, SquashOutcome,
};

fn payload(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn setup(interval: u64, unique_fields: &[&str]) -> (MemoryStore, Chronicle) {
    let store = MemoryStore::new();
    let chronicle = Chronicle::initialize(
        &store,
        "items",
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
    ChunkStore::new(store.collection(&chunks_collection("items")))
}

fn latest() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::minutes(5)
}

/// Flat attribute maps with a handful of keys and scalar-ish values.
fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(
        "[a-e]",
        prop_oneof![
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,6}".prop_map(|s| json!(s)),
            any::<bool>().prop_map(|b| json!(b)),
            prop::collection::vec(any::<i32>(), 0..3).prop_map(|v| json!(v)),
        ],
        0..5,
    )
    .prop_map(|map| map.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `computeDelta(s, s)` is empty and applying it is the identity.
    #[test]
    fn prop_delta_idempotence(state in document_strategy()) {
        let patch = delta::compute(&state, &state);
        prop_assert!(delta::is_empty(&patch));
        prop_assert_eq!(delta::apply(&state, &patch), state);
    }

    /// `applyDelta(a, computeDelta(a, b)) == b` for any two maps.
    #[test]
    fn prop_delta_round_trip(a in document_strategy(), b in document_strategy()) {
        let patch = delta::compute(&a, &b);
        prop_assert_eq!(delta::apply(&a, &patch), b);
    }

    /// After any save sequence: serials are dense from 1, exactly one
    /// chunk is latest, and every serial bound rehydrates to the payload
    /// saved at that serial.
    #[test]
    fn prop_saves_keep_serials_dense_and_rehydratable(
        (interval, values) in (1u64..5, prop::collection::vec(0i64..1000, 1..8))
    ) {
        let (store, chronicle) = setup(interval, &[]);
        let mut expected = Vec::new();
        let mut last = None;
        for v in values {
            // Skip consecutive duplicates: those saves are no-ops.
            if last == Some(v) {
                continue;
            }
            chronicle.save("d1", &payload(json!({"v": v}))).unwrap();
            expected.push(v);
            last = Some(v);
        }
        let n = expected.len() as Serial;

        let active = chronicle.get_active_branch("d1").unwrap().unwrap();
        let chunks = chunk_store(&store)
            .list_ordered("d1", 1, &active.branch_id, &Bound::Latest)
            .unwrap();

        let serials: Vec<Serial> = chunks.iter().map(|c| c.serial).collect();
        prop_assert_eq!(serials, (1..=n).collect::<Vec<_>>());
        prop_assert_eq!(chunks.iter().filter(|c| c.is_latest).count(), 1);
        let latest_chunk = chunks.iter().find(|c| c.is_latest).unwrap();
        prop_assert_eq!(latest_chunk.serial, n);
        prop_assert_eq!(chunks[0].cc_type, ChunkType::Full);

        // Rehydration is defined at every serial bound and reproduces the
        // payload saved there.
        let handle = chunk_store(&store);
        for (serial, v) in (1..=n).zip(expected.iter()) {
            let rehydrated =
                rehydrate(&handle, "d1", 1, &active.branch_id, &Bound::Serial(serial))
                    .unwrap()
                    .unwrap();
            prop_assert_eq!(rehydrated.serial, serial);
            prop_assert_eq!(rehydrated.state["v"].clone(), json!(*v));
        }
    }

    /// Reverting to the serial of the k-th save restores its payload and
    /// removes exactly n-k chunks.
    #[test]
    fn prop_save_revert_round_trip(
        (n, k) in (2u64..7).prop_flat_map(|n| (Just(n), 1..=n))
    ) {
        let (_store, chronicle) = setup(100, &[]);
        for v in 1..=n {
            chronicle.save("d1", &payload(json!({"v": v}))).unwrap();
        }

        let result = chronicle
            .revert("d1", k, &RevertOptions { rehydrate: true, ..Default::default() })
            .unwrap();
        prop_assert_eq!(result.chunks_removed, n - k);
        prop_assert_eq!(&result.state.unwrap()["v"], &json!(k));

        let read = chronicle.as_of("d1", latest(), &AsOfOptions::default()).unwrap();
        prop_assert_eq!(read.serial.unwrap(), k);
        prop_assert_eq!(&read.state.unwrap()["v"], &json!(k));
    }

    /// Live documents on the shared root branch always hold distinct
    /// unique-field values; a save only succeeds when the value is free.
    #[test]
    fn prop_per_branch_uniqueness(
        ops in prop::collection::vec((0usize..4, 0usize..3), 1..20)
    ) {
        let (_store, chronicle) = setup(10, &["email"]);
        let emails = ["a@x", "b@x", "c@x"];
        // email -> doc currently holding it (live) on the root branch
        let mut held: HashMap<&str, usize> = HashMap::new();

        for (doc, email_idx) in ops {
            let doc_id = format!("doc{doc}");
            let email = emails[email_idx];
            let taken_by_other = held.get(email).is_some_and(|holder| *holder != doc);

            let result = chronicle.save(&doc_id, &payload(json!({"email": email})));
            if taken_by_other {
                let is_conflict = matches!(
                    result,
                    Err(ChronicleError::UniqueConstraintViolation { .. })
                );
                prop_assert!(is_conflict);
            } else {
                result.unwrap();
                held.retain(|_, holder| *holder != doc);
                held.insert(email, doc);
            }
        }
    }

    /// Squash leaves one branch, one full chunk, and the state at the
    /// target serial.
    #[test]
    fn prop_squash_closure(
        (n, k) in (2u64..6).prop_flat_map(|n| (Just(n), 1..=n))
    ) {
        let (store, chronicle) = setup(100, &[]);
        for v in 1..=n {
            chronicle.save("d1", &payload(json!({"v": v}))).unwrap();
        }
        chronicle
            .create_branch("d1", "side", &CreateBranchOptions::default())
            .unwrap();

        let outcome = chronicle
            .squash("d1", k, &SquashOptions { confirm: true, ..Default::default() })
            .unwrap();
        let SquashOutcome::Applied { new_branch_id, .. } = outcome else {
            panic!("expected applied squash");
        };

        let branches = chronicle.list_branches("d1").unwrap();
        prop_assert_eq!(branches.len(), 1);
        prop_assert_eq!(branches[0].name.as_str(), "main");
        prop_assert_eq!(branches[0].epoch, 1);

        let chunks = chunk_store(&store)
            .list_ordered("d1", 1, &new_branch_id, &Bound::Latest)
            .unwrap();
        prop_assert_eq!(chunks.len(), 1);
        prop_assert_eq!(chunks[0].serial, 1);
        prop_assert_eq!(chunks[0].cc_type, ChunkType::Full);

        let read = chronicle.as_of("d1", latest(), &AsOfOptions::default()).unwrap();
        prop_assert_eq!(&read.state.unwrap()["v"], &json!(k));
    }
}
