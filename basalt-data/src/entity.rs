//! Entity identity and audit columns
//!
//! Every record managed by this crate carries the same invariant column set:
//! a UUID v4 primary key plus created/updated/deleted audit pairs. The
//! [`Entity`] trait exposes that shape to the generic store and orchestrator
//! without constraining what else a row contains.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::criteria::Value;
use crate::store::StorageError;

/// Column names shared by every entity table.
pub mod columns {
    /// Primary key column.
    pub const ID: &str = "id";
    /// Creation timestamp, stamped by the backend at insert.
    pub const CREATED_AT: &str = "created_at";
    /// Optional reference to the principal that created the record.
    pub const CREATED_BY: &str = "created_by";
    /// Refreshed by the backend on every successful update.
    pub const UPDATED_AT: &str = "updated_at";
    /// Optional reference to the principal behind the latest update.
    pub const UPDATED_BY: &str = "updated_by";
    /// Soft-delete timestamp; null for a live record, never cleared once set.
    pub const DELETED_AT: &str = "deleted_at";
    /// Optional reference to the principal that soft-deleted the record.
    pub const DELETED_BY: &str = "deleted_by";
}

/// A persisted domain record.
///
/// Implementors provide the table binding and read access to the identity and
/// soft-delete columns; the store and orchestrator never need anything else
/// from the concrete row type.
pub trait Entity: Clone + Send + Sync + Unpin + 'static {
    /// Physical table name.
    const TABLE: &'static str;

    /// Primary key, created at insert time and immutable thereafter.
    fn id(&self) -> Uuid;

    /// Soft-delete timestamp; `None` for a live record.
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
}

/// Decode a row from a [`FieldMap`].
///
/// Required by backends that store rows as field maps (the in-memory
/// reference backend); SQL backends decode rows through their own row types
/// instead.
pub trait FromFields: Sized {
    /// Build the typed record from stored fields.
    fn from_fields(fields: &FieldMap) -> Result<Self, StorageError>;
}

/// A partial record: an ordered mapping from column name to scalar value.
///
/// Used for create payloads and update patches. Ordering is deterministic
/// (`BTreeMap`) so rendered SQL and composed queries are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMap(BTreeMap<String, Value>);

impl FieldMap {
    /// Create an empty field map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Insert a value, returning the previous one if present.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Whether the field is present.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(field, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy every field of `other` into `self`, overwriting on collision.
    pub fn merge(&mut self, other: &FieldMap) {
        for (field, value) in other.iter() {
            self.0.insert(field.clone(), value.clone());
        }
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, Value)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Reference to an acting principal, stored in the audit columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identifier of the principal (usually a user id).
    pub id: Uuid,
}

impl Actor {
    /// Create an actor reference from a principal id.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self { id }
    }
}

impl From<Uuid> for Actor {
    fn from(id: Uuid) -> Self {
        Self::new(id)
    }
}
