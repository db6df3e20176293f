//! Typed relation loading
//!
//! The relation names on [`Criteria`](crate::criteria::Criteria) flow through
//! the backend contract untouched; hydrating them onto typed records is
//! entity-specific work. Implement [`RelationLoader`] per parent/related pair
//! and use `batch_load` when expanding a page of parents, so a list endpoint
//! issues one related-record query instead of one per row.

use std::collections::HashMap;
use std::future::Future;

use uuid::Uuid;

use crate::entity::Entity;
use crate::store::StorageError;

/// Loads records related to a parent entity.
pub trait RelationLoader<P: Entity, R: Send>: Send + Sync {
    /// Name this loader answers for, matched against `Criteria::relations`.
    const RELATION: &'static str;

    /// Load the single related record of one parent, if any.
    fn load_one(
        &self,
        parent: &P,
    ) -> impl Future<Output = Result<Option<R>, StorageError>> + Send;

    /// Load all related records of one parent.
    fn load_many(
        &self,
        parent: &P,
    ) -> impl Future<Output = Result<Vec<R>, StorageError>> + Send;

    /// Load related records for a batch of parents in one round trip,
    /// keyed by parent id.
    fn batch_load(
        &self,
        parents: &[P],
    ) -> impl Future<Output = Result<HashMap<Uuid, Vec<R>>, StorageError>> + Send;
}
