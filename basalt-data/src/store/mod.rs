//! Generic record store
//!
//! [`RecordStore`] binds one entity type to one persistence backend and
//! exposes the repository surface the orchestrator builds on: save with
//! read-back, criteria reads, affected-count updates, soft and hard deletes,
//! and unit-of-work transactions. Every store value carries an [`OpContext`];
//! [`RecordStore::run_in_transaction`] hands its closure a store bound to the
//! open transaction, so transactional scope is part of the call chain and
//! never global state.

mod backend;
pub mod memory;
pub mod pg;

pub use backend::{sqlstate, OpContext, StorageBackend, StorageError, TxnId, TxnManager};

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use uuid::Uuid;

use crate::criteria::{compose, Criteria, EffectiveFilter, EffectiveQuery, Page, SortSpec};
use crate::entity::{Entity, FieldMap};

/// Options for a single-record read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    /// Relations to expand on the returned record.
    pub relations: Vec<String>,
}

impl ReadOptions {
    /// No relation expansion.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Expand the given relations.
    #[must_use]
    pub fn with_relations(relations: Vec<String>) -> Self {
        Self { relations }
    }
}

/// Options for id-list reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    /// Relations to expand on returned records.
    pub relations: Vec<String>,
    /// Sort fields in priority order.
    pub sort: SortSpec,
    /// Pagination window, if any.
    pub pagination: Option<Page>,
}

/// Repository bound to one entity type and one backend.
///
/// Cheap to clone; clones share the backend and differ only in their
/// operation context.
pub struct RecordStore<E, B> {
    backend: Arc<B>,
    ctx: OpContext,
    _entity: PhantomData<fn() -> E>,
}

impl<E, B> Clone for RecordStore<E, B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ctx: self.ctx,
            _entity: PhantomData,
        }
    }
}

impl<E, B> RecordStore<E, B>
where
    E: Entity,
    B: StorageBackend<E>,
{
    /// Store over the given backend, outside any transaction.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            ctx: OpContext::detached(),
            _entity: PhantomData,
        }
    }

    /// The backend this store executes against.
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Whether this store is bound to an open transaction.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.ctx.txn.is_some()
    }

    fn scoped(&self, txn: TxnId) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ctx: OpContext::in_txn(txn),
            _entity: PhantomData,
        }
    }

    /// Stage a record in memory. No identity is assigned and nothing touches
    /// the backend; [`RecordStore::save`] persists the staged fields.
    #[must_use]
    pub fn create(&self, fields: FieldMap) -> FieldMap {
        fields
    }

    /// Insert a record and read it back, expanding requested relations.
    pub async fn save(
        &self,
        fields: FieldMap,
        options: &ReadOptions,
    ) -> Result<E, StorageError> {
        let inserted = self.backend.insert(&self.ctx, fields).await?;
        let query = EffectiveQuery::by_ids(vec![inserted.id()], options.relations.clone());
        self.backend
            .select_one(&self.ctx, &query)
            .await?
            .ok_or_else(|| StorageError::message("inserted row vanished before read-back"))
    }

    /// Insert several records, preserving order.
    pub async fn save_many(&self, rows: Vec<FieldMap>) -> Result<Vec<E>, StorageError> {
        self.backend.insert_many(&self.ctx, rows).await
    }

    /// Patch one record by id; returns the affected-row count.
    pub async fn update(&self, id: Uuid, patch: &FieldMap) -> Result<u64, StorageError> {
        self.backend
            .update_where(&self.ctx, &EffectiveFilter::Ids(vec![id]), patch)
            .await
    }

    /// Patch every record matching the criteria; returns the affected count.
    pub async fn update_by_criteria(
        &self,
        criteria: &Criteria,
        patch: &FieldMap,
    ) -> Result<u64, StorageError> {
        let query = compose(criteria);
        self.backend
            .update_where(&self.ctx, &query.filter, patch)
            .await
    }

    /// Patch the listed records; returns the affected count.
    pub async fn update_by_ids(&self, ids: &[Uuid], patch: &FieldMap) -> Result<u64, StorageError> {
        self.backend
            .update_where(&self.ctx, &EffectiveFilter::Ids(ids.to_vec()), patch)
            .await
    }

    /// Fetch one record by id, tombstoned or not.
    pub async fn get(&self, id: Uuid, options: &ReadOptions) -> Result<Option<E>, StorageError> {
        let query = EffectiveQuery::by_ids(vec![id], options.relations.clone());
        self.backend.select_one(&self.ctx, &query).await
    }

    /// Fetch the first record matching the criteria.
    pub async fn get_one(&self, criteria: &Criteria) -> Result<Option<E>, StorageError> {
        let mut query = compose(criteria);
        query.page = None;
        self.backend.select_one(&self.ctx, &query).await
    }

    /// Fetch the listed records, honoring sort and pagination.
    pub async fn get_by_ids(
        &self,
        ids: &[Uuid],
        options: &ListOptions,
    ) -> Result<Vec<E>, StorageError> {
        let query = EffectiveQuery {
            filter: EffectiveFilter::Ids(ids.to_vec()),
            sort: options.sort.expand(),
            page: options.pagination,
            relations: options.relations.clone(),
        };
        self.backend.select_many(&self.ctx, &query).await
    }

    /// Fetch every record matching the criteria plus the total match count.
    /// The total ignores pagination: it reflects the filter, not the window.
    pub async fn get_many(&self, criteria: &Criteria) -> Result<(Vec<E>, u64), StorageError> {
        let query = compose(criteria);
        let rows = self.backend.select_many(&self.ctx, &query).await?;
        let total = self.backend.count(&self.ctx, &query.filter).await?;
        Ok((rows, total))
    }

    /// Count records matching the criteria.
    pub async fn count(&self, criteria: &Criteria) -> Result<u64, StorageError> {
        let query = compose(criteria);
        self.backend.count(&self.ctx, &query.filter).await
    }

    /// Soft-delete one record by id; returns the affected count.
    pub async fn delete(&self, id: Uuid) -> Result<u64, StorageError> {
        self.backend
            .soft_delete_where(&self.ctx, &EffectiveFilter::Ids(vec![id]))
            .await
    }

    /// Soft-delete the listed records; returns the affected count.
    pub async fn delete_by_ids(&self, ids: &[Uuid]) -> Result<u64, StorageError> {
        self.backend
            .soft_delete_where(&self.ctx, &EffectiveFilter::Ids(ids.to_vec()))
            .await
    }

    /// Physically remove one record by id; returns the affected count.
    pub async fn hard_delete(&self, id: Uuid) -> Result<u64, StorageError> {
        self.backend
            .hard_delete_where(&self.ctx, &EffectiveFilter::Ids(vec![id]))
            .await
    }

    /// Physically remove the listed records; returns the affected count.
    pub async fn hard_delete_by_ids(&self, ids: &[Uuid]) -> Result<u64, StorageError> {
        self.backend
            .hard_delete_where(&self.ctx, &EffectiveFilter::Ids(ids.to_vec()))
            .await
    }

    /// Run `f` inside a transaction.
    ///
    /// If this store is already transactional the closure runs with a clone
    /// of it — the surrounding unit of work is reused, never nested, and the
    /// outer caller keeps commit/rollback responsibility. Otherwise a fresh
    /// transaction is opened; it commits when `f` returns `Ok` and rolls back
    /// when it returns `Err`, exactly once either way.
    pub async fn run_in_transaction<T, Err, F, Fut>(&self, f: F) -> Result<T, Err>
    where
        Err: From<StorageError>,
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, Err>>,
    {
        if self.in_transaction() {
            return f(self.clone()).await;
        }
        let txn = self.backend.begin().await.map_err(Err::from)?;
        tracing::debug!(?txn, "transaction opened");
        match f(self.scoped(txn)).await {
            Ok(value) => {
                self.backend.commit(txn).await.map_err(Err::from)?;
                tracing::debug!(?txn, "transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.backend.rollback(txn).await {
                    tracing::error!(?txn, error = %rollback_err, "rollback failed");
                } else {
                    tracing::debug!(?txn, "transaction rolled back");
                }
                Err(err)
            }
        }
    }
}
