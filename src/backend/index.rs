//! Index declarations.
//!
//! The engine declares its indexes through [`IndexSpec`]; a backend is
//! expected to enforce the unique ones (including partial unique indexes,
//! which only constrain documents matching their filter). Non-unique
//! specs are access-path hints a backend may use or ignore.

use super::filter::{Filter, SortOrder};

/// Declaration of one index on a collection.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    name: String,
    keys: Vec<(String, SortOrder)>,
    unique: bool,
    partial_filter: Option<Filter>,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
            unique: false,
            partial_filter: None,
        }
    }

    pub fn key(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.keys.push((field.into(), order));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Restrict the index to documents matching `filter`. For unique
    /// indexes, only matching documents participate in the constraint.
    pub fn partial(mut self, filter: Filter) -> Self {
        self.partial_filter = Some(filter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn partial_filter(&self) -> Option<&Filter> {
        self.partial_filter.as_ref()
    }
}
