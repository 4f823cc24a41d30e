//! Secondary index descriptions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub order: IndexOrder,
}

/// A secondary index over one or more document fields.
///
/// An index without an explicit name gets one derived from its keys
/// (`Field_1_Other_-1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModel {
    pub name: Option<String>,
    pub keys: Vec<IndexKey>,
}

impl IndexModel {
    pub fn new() -> Self {
        Self {
            name: None,
            keys: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn ascending(mut self, field: &str) -> Self {
        self.keys.push(IndexKey {
            field: field.to_string(),
            order: IndexOrder::Ascending,
        });
        self
    }

    /// Copy of this index with the explicit name removed.
    pub fn unnamed(&self) -> Self {
        Self {
            name: None,
            keys: self.keys.clone(),
        }
    }

    /// The explicit name, or the name derived from the keys.
    pub fn effective_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .keys
                .iter()
                .map(|k| match k.order {
                    IndexOrder::Ascending => format!("{}_1", k.field),
                    IndexOrder::Descending => format!("{}_-1", k.field),
                })
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    /// Same keys in the same order, regardless of name.
    pub fn is_equivalent(&self, other: &IndexModel) -> bool {
        self.keys == other.keys
    }
}

impl Default for IndexModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide how a requested index fits into an existing catalog.
///
/// Returns `Ok(true)` when it must be added, `Ok(false)` when an identical
/// index is already present, and an error on a name or options conflict.
pub(crate) fn check_catalog(
    collection: &str,
    catalog: &[IndexModel],
    requested: &IndexModel,
) -> crate::StoreResult<bool> {
    let name = requested.effective_name();
    for existing in catalog {
        let existing_name = existing.effective_name();
        if existing_name == name {
            if existing.is_equivalent(requested) {
                return Ok(false);
            }
            return Err(crate::StoreError::IndexNameConflict {
                collection: collection.to_string(),
                name,
            });
        }
        if existing.is_equivalent(requested) {
            return Err(crate::StoreError::IndexOptionsConflict {
                collection: collection.to_string(),
                requested: name,
                existing: existing_name,
            });
        }
    }
    Ok(true)
}
