//! Typed operations over a `{collection}_chronicle_branches` collection.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{
    Collection, Filter, FindOptions, IndexSpec, SortOrder, StoreResult, Update,
};
use crate::model::{self, ChronicleBranch, Epoch, Serial};

/// Name of the unique `(docId, epoch, branchId)` index. Branch ids are
/// unique within a document's epoch, not globally: every root branch
/// shares the `main` identity.
pub const BRANCH_IDENTITY_INDEX: &str = "branch_identity";

/// Handle on one branch collection.
#[derive(Clone)]
pub struct BranchStore {
    coll: Arc<dyn Collection>,
}

impl BranchStore {
    pub fn new(coll: Arc<dyn Collection>) -> Self {
        Self { coll }
    }

    pub fn ensure_indexes(&self) -> StoreResult<()> {
        self.coll.create_index(
            IndexSpec::new(BRANCH_IDENTITY_INDEX)
                .key("docId", SortOrder::Asc)
                .key("epoch", SortOrder::Asc)
                .key("branchId", SortOrder::Asc)
                .unique(),
        )?;
        self.coll.create_index(
            IndexSpec::new("branch_parent")
                .key("parentBranchId", SortOrder::Asc)
                .key("parentSerial", SortOrder::Asc),
        )?;
        Ok(())
    }

    pub fn insert(&self, branch: &ChronicleBranch) -> StoreResult<()> {
        self.coll.insert_one(model::to_document(branch)?)?;
        debug!(
            doc_id = %branch.doc_id,
            branch_id = %branch.branch_id,
            name = %branch.name,
            parent_serial = ?branch.parent_serial,
            "created branch"
        );
        Ok(())
    }

    /// The branch with `branch_id`, provided it belongs to `(doc_id, epoch)`.
    pub fn find(
        &self,
        doc_id: &str,
        epoch: Epoch,
        branch_id: &str,
    ) -> StoreResult<Option<ChronicleBranch>> {
        let doc = self.coll.find_one(
            &Filter::new()
                .eq("docId", doc_id)
                .eq("epoch", epoch)
                .eq("branchId", branch_id),
            &FindOptions::new(),
        )?;
        doc.map(model::from_document).transpose()
    }

    /// All branches of `(doc_id, epoch)`, oldest first.
    pub fn list(&self, doc_id: &str, epoch: Epoch) -> StoreResult<Vec<ChronicleBranch>> {
        let docs = self.coll.find(
            &Filter::new().eq("docId", doc_id).eq("epoch", epoch),
            &FindOptions::new().sort_asc("createdAt").sort_asc("branchId"),
        )?;
        docs.into_iter().map(model::from_document).collect()
    }

    /// Reattach children whose divergence point no longer exists: every
    /// branch parented on `parent_branch_id` past `target_serial` gets its
    /// `parentSerial` pulled back to `target_serial`. Returns the count.
    pub fn reattach_children(
        &self,
        doc_id: &str,
        epoch: Epoch,
        parent_branch_id: &str,
        target_serial: Serial,
    ) -> StoreResult<u64> {
        self.coll.update_many(
            &Filter::new()
                .eq("docId", doc_id)
                .eq("epoch", epoch)
                .eq("parentBranchId", parent_branch_id)
                .gt("parentSerial", target_serial),
            &Update::new().set("parentSerial", target_serial),
        )
    }

    /// Cascade-delete the branches of a document, optionally one epoch only.
    pub fn delete_all(&self, doc_id: &str, epoch: Option<Epoch>) -> StoreResult<u64> {
        let mut filter = Filter::new().eq("docId", doc_id);
        if let Some(epoch) = epoch {
            filter = filter.eq("epoch", epoch);
        }
        self.coll.delete_many(&filter)
    }

    /// Count all branches of a document across epochs.
    pub fn count(&self, doc_id: &str) -> StoreResult<u64> {
        self.coll
            .count_documents(&Filter::new().eq("docId", doc_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DocumentStore, MemoryStore};
    use crate::model::MAIN_BRANCH;
    use chrono::Utc;

    fn store() -> BranchStore {
        let backend = MemoryStore::new();
        let branches = BranchStore::new(backend.collection("orders_chronicle_branches"));
        branches.ensure_indexes().unwrap();
        branches
    }

    fn branch(branch_id: &str, parent: Option<(&str, Serial)>) -> ChronicleBranch {
        ChronicleBranch {
            branch_id: branch_id.to_string(),
            doc_id: "d1".to_string(),
            epoch: 1,
            parent_branch_id: parent.map(|(id, _)| id.to_string()),
            parent_serial: parent.map(|(_, serial)| serial),
            name: if parent.is_none() {
                MAIN_BRANCH.to_string()
            } else {
                format!("feature-{branch_id}")
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_find_scoped_to_doc_and_epoch() {
        let branches = store();
        branches.insert(&branch("b1", None)).unwrap();

        assert!(branches.find("d1", 1, "b1").unwrap().is_some());
        assert!(branches.find("d1", 2, "b1").unwrap().is_none());
        assert!(branches.find("other", 1, "b1").unwrap().is_none());
    }

    #[test]
    fn test_reattach_children_pulls_back_parent_serial() {
        let branches = store();
        branches.insert(&branch("b1", None)).unwrap();
        branches.insert(&branch("b2", Some(("b1", 3)))).unwrap();
        branches.insert(&branch("b3", Some(("b1", 5)))).unwrap();
        branches.insert(&branch("b4", Some(("b1", 2)))).unwrap();

        let updated = branches.reattach_children("d1", 1, "b1", 2).unwrap();
        assert_eq!(updated, 2);

        assert_eq!(branches.find("d1", 1, "b2").unwrap().unwrap().parent_serial, Some(2));
        assert_eq!(branches.find("d1", 1, "b3").unwrap().unwrap().parent_serial, Some(2));
        // Already at or before the target: untouched.
        assert_eq!(branches.find("d1", 1, "b4").unwrap().unwrap().parent_serial, Some(2));
    }

    #[test]
    fn test_delete_all_scoped_to_epoch() {
        let branches = store();
        branches.insert(&branch("b1", None)).unwrap();
        let mut second_epoch = branch("b2", None);
        second_epoch.epoch = 2;
        branches.insert(&second_epoch).unwrap();

        assert_eq!(branches.delete_all("d1", Some(1)).unwrap(), 1);
        assert_eq!(branches.count("d1").unwrap(), 1);
        assert!(branches.find("d1", 2, "b2").unwrap().is_some());
    }
}
