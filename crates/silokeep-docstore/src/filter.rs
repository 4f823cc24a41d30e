//! Query predicates over documents.
//!
//! Filters are built by hand per table; there is no query language. Field
//! comparisons only match when the field is present and of a comparable
//! JSON type (number against number, string against string).

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::{Document, ID_FIELD};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Eq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Match a single document by primary key.
    pub fn id(id: &str) -> Self {
        Filter::Eq(ID_FIELD.to_string(), Value::from(id))
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gt(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(field.to_string(), value.into())
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Filter::Lte(field.to_string(), value.into())
    }

    /// Conjoin with another filter, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), f) => {
                left.push(f);
                Filter::And(left)
            }
            (f, Filter::And(mut right)) => {
                right.insert(0, f);
                Filter::And(right)
            }
            (left, right) => Filter::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::Or(mut left), f) => {
                left.push(f);
                Filter::Or(left)
            }
            (left, right) => Filter::Or(vec![left, right]),
        }
    }

    /// The `_id` every matching document must carry, when the filter pins one.
    pub fn pinned_id(&self) -> Option<&str> {
        match self {
            Filter::Eq(field, Value::String(id)) if field == ID_FIELD => Some(id.as_str()),
            Filter::And(parts) => parts.iter().find_map(Filter::pinned_id),
            _ => None,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, expected) => doc
                .get(field)
                .is_some_and(|actual| compare(actual, expected) == Some(Ordering::Equal)),
            Filter::Gt(field, bound) => field_cmp(doc, field, bound, |o| o == Ordering::Greater),
            Filter::Gte(field, bound) => field_cmp(doc, field, bound, |o| o != Ordering::Less),
            Filter::Lt(field, bound) => field_cmp(doc, field, bound, |o| o == Ordering::Less),
            Filter::Lte(field, bound) => field_cmp(doc, field, bound, |o| o != Ordering::Greater),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
        }
    }
}

fn field_cmp(doc: &Document, field: &str, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    doc.get(field)
        .and_then(|actual| compare(actual, bound))
        .is_some_and(accept)
}

/// Order two JSON values when they are of comparable types.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}
