//! Query vocabulary: conjunctive filters, sort/limit options, and update
//! documents.
//!
//! Filters are conjunctions of per-field comparisons. Field names may be
//! dotted paths (`payload.email`). Comparison semantics follow the usual
//! document-store conventions: `Eq`/`Gt`/`Lt` require the field to be
//! present, `Ne` also matches absent fields, `Exists` tests presence.

use std::cmp::Ordering;

use serde_json::Value;

use super::Document;

/// A single field comparison
#[derive(Debug, Clone)]
pub enum Cmp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Exists(bool),
}

/// A conjunction of field comparisons. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Cmp)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Cmp::Eq(value.into())));
        self
    }

    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Cmp::Ne(value.into())));
        self
    }

    pub fn gt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Cmp::Gt(value.into())));
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Cmp::Gte(value.into())));
        self
    }

    pub fn lt(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Cmp::Lt(value.into())));
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), Cmp::Lte(value.into())));
        self
    }

    pub fn is_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.clauses.push((field.into(), Cmp::In(values)));
        self
    }

    pub fn exists(mut self, field: impl Into<String>, present: bool) -> Self {
        self.clauses.push((field.into(), Cmp::Exists(present)));
        self
    }

    /// All clauses of this filter.
    pub fn clauses(&self) -> &[(String, Cmp)] {
        &self.clauses
    }

    /// True if `doc` satisfies every clause.
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|(field, cmp)| {
            let value = lookup_path(doc, field);
            match cmp {
                Cmp::Eq(target) => value == Some(target),
                Cmp::Ne(target) => value != Some(target),
                Cmp::Gt(target) => {
                    value.is_some_and(|v| cmp_values(v, target) == Ordering::Greater)
                }
                Cmp::Gte(target) => value.is_some_and(|v| cmp_values(v, target) != Ordering::Less),
                Cmp::Lt(target) => value.is_some_and(|v| cmp_values(v, target) == Ordering::Less),
                Cmp::Lte(target) => {
                    value.is_some_and(|v| cmp_values(v, target) != Ordering::Greater)
                }
                Cmp::In(targets) => value.is_some_and(|v| targets.contains(v)),
                Cmp::Exists(present) => value.is_some() == *present,
            }
        })
    }

    /// The equality clauses of this filter, used to seed upserted documents.
    pub fn eq_clauses(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.clauses.iter().filter_map(|(field, cmp)| match cmp {
            Cmp::Eq(value) => Some((field.as_str(), value)),
            _ => None,
        })
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Options for `find` / `find_one`
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    sort: Vec<(String, SortOrder)>,
    limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_asc(mut self, field: impl Into<String>) -> Self {
        self.sort.push((field.into(), SortOrder::Asc));
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort.push((field.into(), SortOrder::Desc));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(&self) -> &[(String, SortOrder)] {
        &self.sort
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }
}

/// A top-level field update: `$set` and `$unset` equivalents.
#[derive(Debug, Clone, Default)]
pub struct Update {
    set: Document,
    unset: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    pub fn set_fields(&self) -> &Document {
        &self.set
    }

    pub fn unset_fields(&self) -> &[String] {
        &self.unset
    }

    /// Apply this update to a document in place.
    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in &self.set {
            doc.insert(field.clone(), value.clone());
        }
        for field in &self.unset {
            doc.remove(field);
        }
    }
}

/// Resolve a dotted field path against a document.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Total order over JSON values for sorting and range comparisons.
///
/// Values of different kinds order by kind (null < bool < number < string <
/// array < object); numbers compare numerically, strings lexicographically,
/// arrays element-wise.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    fn kind(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let ord = cmp_values(xv, yv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => kind(a).cmp(&kind(b)),
    }
}
