//! In-memory reference backend.
//!
//! Generalizes the usual in-process test store: documents live in a
//! `RwLock`-guarded vector per collection, filters and sorts are evaluated
//! in full, and unique indexes (including partial ones) are enforced on
//! every insert and update so that index-level races surface exactly as
//! they would against a real document database.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::filter::{cmp_values, lookup_path, Filter, FindOptions, SortOrder, Update};
use super::index::IndexSpec;
use super::{Collection, Document, DocumentStore, StoreError, StoreResult, UpdateOutcome};

/// An in-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        if let Ok(collections) = self.collections.read() {
            if let Some(existing) = collections.get(name) {
                return Arc::clone(existing) as Arc<dyn Collection>;
            }
        }
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)));
        Arc::clone(entry) as Arc<dyn Collection>
    }
}

/// One in-memory collection.
pub struct MemoryCollection {
    name: String,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    docs: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|e| StoreError::Lock(e.to_string()))
    }
}

impl Inner {
    /// Verify `candidate` against every unique index, skipping the document
    /// at `exclude` (its own position during an update).
    fn check_unique(&self, candidate: &Document, exclude: Option<usize>) -> StoreResult<()> {
        for spec in self.indexes.iter().filter(|s| s.is_unique()) {
            if let Some(partial) = spec.partial_filter() {
                if !partial.matches(candidate) {
                    continue;
                }
            }
            let key: Vec<Option<&Value>> = spec
                .keys()
                .iter()
                .map(|(field, _)| lookup_path(candidate, field))
                .collect();

            for (position, other) in self.docs.iter().enumerate() {
                if exclude == Some(position) {
                    continue;
                }
                if let Some(partial) = spec.partial_filter() {
                    if !partial.matches(other) {
                        continue;
                    }
                }
                let other_key: Vec<Option<&Value>> = spec
                    .keys()
                    .iter()
                    .map(|(field, _)| lookup_path(other, field))
                    .collect();
                if key == other_key {
                    let (field, _) = &spec.keys()[0];
                    return Err(StoreError::DuplicateKey {
                        index: spec.name().to_string(),
                        field: field.clone(),
                        value: key[0].cloned().unwrap_or(Value::Null),
                    });
                }
            }
        }
        Ok(())
    }

    fn matching_positions(&self, filter: &Filter) -> Vec<usize> {
        self.docs
            .iter()
            .enumerate()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(position, _)| position)
            .collect()
    }
}

fn ensure_id(doc: &mut Document) {
    if !doc.contains_key("_id") {
        doc.insert(
            "_id".to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
}

fn sort_documents(docs: &mut [Document], sort: &[(String, SortOrder)]) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, order) in sort {
            let av = lookup_path(a, field).unwrap_or(&Value::Null);
            let bv = lookup_path(b, field).unwrap_or(&Value::Null);
            let ord = match order {
                SortOrder::Asc => cmp_values(av, bv),
                SortOrder::Desc => cmp_values(bv, av),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Build the document an upsert inserts: the filter's equality clauses
/// overlaid with the update's set fields.
fn upsert_seed(filter: &Filter, update: &Update) -> Document {
    let mut doc = Document::new();
    for (field, value) in filter.eq_clauses() {
        if !field.contains('.') {
            doc.insert(field.to_string(), value.clone());
        }
    }
    update.apply(&mut doc);
    doc
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(&self, mut doc: Document) -> StoreResult<()> {
        let mut inner = self.write()?;
        ensure_id(&mut doc);
        inner.check_unique(&doc, None)?;
        inner.docs.push(doc);
        Ok(())
    }

    fn find_one(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Option<Document>> {
        let mut results = self.find(filter, options)?;
        if results.is_empty() {
            Ok(None)
        } else {
            Ok(Some(results.swap_remove(0)))
        }
    }

    fn find(&self, filter: &Filter, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let inner = self.read()?;
        let mut results: Vec<Document> = inner
            .docs
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        drop(inner);

        sort_documents(&mut results, options.sort());
        if let Some(limit) = options.limit_value() {
            results.truncate(limit);
        }
        Ok(results)
    }

    fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome> {
        let mut inner = self.write()?;
        match inner.matching_positions(filter).first().copied() {
            Some(position) => {
                let mut updated = inner.docs[position].clone();
                update.apply(&mut updated);
                inner.check_unique(&updated, Some(position))?;
                inner.docs[position] = updated;
                Ok(UpdateOutcome {
                    matched: 1,
                    upserted: false,
                })
            }
            None if upsert => {
                let mut doc = upsert_seed(filter, update);
                ensure_id(&mut doc);
                inner.check_unique(&doc, None)?;
                inner.docs.push(doc);
                Ok(UpdateOutcome {
                    matched: 0,
                    upserted: true,
                })
            }
            None => Ok(UpdateOutcome {
                matched: 0,
                upserted: false,
            }),
        }
    }

    fn update_many(&self, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let mut inner = self.write()?;
        let positions = inner.matching_positions(filter);
        for position in &positions {
            let mut updated = inner.docs[*position].clone();
            update.apply(&mut updated);
            inner.check_unique(&updated, Some(*position))?;
            inner.docs[*position] = updated;
        }
        Ok(positions.len() as u64)
    }

    fn delete_one(&self, filter: &Filter) -> StoreResult<bool> {
        let mut inner = self.write()?;
        match inner.matching_positions(filter).first().copied() {
            Some(position) => {
                inner.docs.remove(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_many(&self, filter: &Filter) -> StoreResult<u64> {
        let mut inner = self.write()?;
        let before = inner.docs.len();
        inner.docs.retain(|doc| !filter.matches(doc));
        Ok((before - inner.docs.len()) as u64)
    }

    fn count_documents(&self, filter: &Filter) -> StoreResult<u64> {
        let inner = self.read()?;
        Ok(inner.docs.iter().filter(|doc| filter.matches(doc)).count() as u64)
    }

    fn create_index(&self, spec: IndexSpec) -> StoreResult<()> {
        let mut inner = self.write()?;
        if inner.indexes.iter().any(|s| s.name() == spec.name()) {
            return Ok(());
        }
        inner.indexes.push(spec);
        Ok(())
    }
}
