//! CRUD orchestrator
//!
//! [`CrudService`] wraps a [`RecordStore`] with the domain-facing rules that
//! every entity shares: UUID v4 id validation before storage is touched,
//! audit stamping of acting principals, soft-delete visibility on every read,
//! success envelopes for bulk operations, and classification of raw storage
//! failures into the [`CrudError`] taxonomy. An optional [`ErrorHook`] is
//! consulted before the classifier on every failure path, so applications can
//! override classification per entity.
//!
//! Zero-affected updates are deliberately asymmetric, matching long-standing
//! caller expectations: updating one record that is not there is a 404, while
//! bulk updates that match nothing succeed silently.

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::criteria::{Criteria, CriteriaNode, Page, SortSpec, Value};
use crate::entity::{columns, Actor, Entity, FieldMap};
use crate::error::{classify, CrudError};
use crate::registry::ConstraintRegistry;
use crate::response::{Operation, PaginatedResponse, StatusResponse};
use crate::store::{ListOptions, ReadOptions, RecordStore, StorageBackend, StorageError};

/// Per-entity override consulted before the classifier; the first
/// `Some(CrudError)` it returns is surfaced as-is.
pub type ErrorHook = Arc<dyn Fn(&StorageError) -> Option<CrudError> + Send + Sync>;

/// Result of a criteria list read: bare records, or a pagination envelope
/// when the criteria carried a window.
#[derive(Debug, Clone, PartialEq)]
pub enum ManyRecords<E> {
    /// No window was supplied.
    Plain(Vec<E>),
    /// A window was supplied; the envelope carries the window-ignoring total.
    Paginated(PaginatedResponse<E>),
}

impl<E> ManyRecords<E> {
    /// The records, ignoring any envelope.
    #[must_use]
    pub fn records(&self) -> &[E] {
        match self {
            ManyRecords::Plain(rows) => rows,
            ManyRecords::Paginated(page) => &page.data,
        }
    }

    /// Unwrap into the records, discarding any envelope.
    #[must_use]
    pub fn into_records(self) -> Vec<E> {
        match self {
            ManyRecords::Plain(rows) => rows,
            ManyRecords::Paginated(page) => page.data,
        }
    }
}

/// Generic CRUD orchestrator for one entity type.
pub struct CrudService<E, B> {
    store: RecordStore<E, B>,
    entity_name: String,
    unique_field: Option<String>,
    registry: Arc<ConstraintRegistry>,
    hook: Option<ErrorHook>,
}

impl<E, B> Clone for CrudService<E, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            entity_name: self.entity_name.clone(),
            unique_field: self.unique_field.clone(),
            registry: Arc::clone(&self.registry),
            hook: self.hook.clone(),
        }
    }
}

impl<E, B> CrudService<E, B>
where
    E: Entity,
    B: StorageBackend<E>,
{
    /// Orchestrator over a store; `entity_name` feeds error codes and
    /// messages (`"user"` yields `USER_404_ID`).
    #[must_use]
    pub fn new(store: RecordStore<E, B>, entity_name: impl Into<String>) -> Self {
        Self {
            store,
            entity_name: entity_name.into(),
            unique_field: None,
            registry: Arc::new(ConstraintRegistry::new()),
            hook: None,
        }
    }

    /// Field reported for unique violations whose constraint does not
    /// resolve through the registry.
    #[must_use]
    pub fn with_unique_field(mut self, field: impl Into<String>) -> Self {
        self.unique_field = Some(field.into());
        self
    }

    /// Constraint registry used when classifying violations.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ConstraintRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Error hook consulted before the classifier.
    #[must_use]
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &RecordStore<E, B> {
        &self.store
    }

    fn with_store(&self, store: RecordStore<E, B>) -> Self {
        let mut scoped = self.clone();
        scoped.store = store;
        scoped
    }

    fn fail(&self, err: StorageError) -> CrudError {
        if let Some(hook) = &self.hook {
            if let Some(mapped) = hook(&err) {
                return mapped;
            }
        }
        classify(
            err,
            &self.entity_name,
            self.unique_field.as_deref(),
            &self.registry,
        )
    }

    fn parse_id(&self, id: &str) -> Result<Uuid, CrudError> {
        Uuid::parse_str(id)
            .ok()
            .filter(|id| id.get_version_num() == 4)
            .ok_or_else(|| CrudError::InvalidId {
                entity: self.entity_name.clone(),
            })
    }

    fn parse_ids(&self, ids: &[&str]) -> Result<Vec<Uuid>, CrudError> {
        ids.iter().map(|id| self.parse_id(id)).collect()
    }

    fn not_found_by_id(&self) -> CrudError {
        CrudError::NotFoundById {
            entity: self.entity_name.clone(),
        }
    }

    fn not_found_condition(&self) -> CrudError {
        CrudError::NotFoundCondition {
            entity: self.entity_name.clone(),
        }
    }

    fn stamp(dto: &mut FieldMap, column: &str, actor: Option<&Actor>) {
        // Absent actor leaves the column untouched, so repeated anonymous
        // writes never clear an earlier principal.
        if let Some(actor) = actor {
            dto.insert(column, actor.id);
        }
    }

    fn live_only(mut criteria: Criteria) -> Criteria {
        criteria
            .exact
            .insert(columns::DELETED_AT.into(), CriteriaNode::Value(Value::Null));
        criteria
    }

    async fn stamp_deleted_by(&self, ids: &[Uuid], actor: &Actor) {
        // Best effort: the delete already succeeded, a failed stamp must not
        // undo that from the caller's point of view.
        let patch = FieldMap::new().set(columns::DELETED_BY, actor.id);
        if let Err(err) = self.store.update_by_ids(ids, &patch).await {
            tracing::warn!(
                entity = %self.entity_name,
                error = %err,
                "deleted_by stamp failed after successful delete"
            );
        }
    }

    /// Stage a record in memory, stamping the creating principal. No I/O.
    #[must_use]
    pub fn create(&self, dto: FieldMap, actor: Option<&Actor>) -> FieldMap {
        let mut dto = dto;
        Self::stamp(&mut dto, columns::CREATED_BY, actor);
        self.store.create(dto)
    }

    /// Persist a record and return it read back, relations expanded.
    pub async fn save(
        &self,
        dto: FieldMap,
        options: &ReadOptions,
        actor: Option<&Actor>,
    ) -> Result<E, CrudError> {
        let mut dto = dto;
        Self::stamp(&mut dto, columns::CREATED_BY, actor);
        self.store
            .save(dto, options)
            .await
            .map_err(|err| self.fail(err))
    }

    /// Persist several records, preserving order.
    pub async fn save_many(
        &self,
        dtos: Vec<FieldMap>,
        actor: Option<&Actor>,
    ) -> Result<Vec<E>, CrudError> {
        let dtos = dtos
            .into_iter()
            .map(|mut dto| {
                Self::stamp(&mut dto, columns::CREATED_BY, actor);
                dto
            })
            .collect();
        self.store
            .save_many(dtos)
            .await
            .map_err(|err| self.fail(err))
    }

    /// Update one record by id and return it read back.
    ///
    /// Zero affected rows is a 404; the id names a specific record the
    /// caller expects to exist.
    pub async fn update(
        &self,
        id: &str,
        patch: FieldMap,
        options: &ReadOptions,
        actor: Option<&Actor>,
    ) -> Result<E, CrudError> {
        let uuid = self.parse_id(id)?;
        let mut patch = patch;
        Self::stamp(&mut patch, columns::UPDATED_BY, actor);
        let affected = self
            .store
            .update(uuid, &patch)
            .await
            .map_err(|err| self.fail(err))?;
        if affected == 0 {
            return Err(self.not_found_by_id());
        }
        self.get(id, options).await
    }

    /// Update the first record matching the criteria and return it.
    /// Zero affected rows is a 404.
    pub async fn update_one(
        &self,
        criteria: Criteria,
        patch: FieldMap,
        actor: Option<&Actor>,
    ) -> Result<E, CrudError> {
        let criteria = Self::live_only(criteria);
        let mut patch = patch;
        Self::stamp(&mut patch, columns::UPDATED_BY, actor);
        let affected = self
            .store
            .update_by_criteria(&criteria, &patch)
            .await
            .map_err(|err| self.fail(err))?;
        if affected == 0 {
            return Err(self.not_found_condition());
        }
        self.get_one(criteria).await
    }

    /// Update every record matching the criteria. Matching nothing is a
    /// silent success.
    pub async fn update_many(
        &self,
        criteria: Criteria,
        patch: FieldMap,
        actor: Option<&Actor>,
    ) -> Result<StatusResponse, CrudError> {
        let criteria = Self::live_only(criteria);
        let mut patch = patch;
        Self::stamp(&mut patch, columns::UPDATED_BY, actor);
        self.store
            .update_by_criteria(&criteria, &patch)
            .await
            .map_err(|err| self.fail(err))?;
        Ok(StatusResponse::success(Operation::Update, &self.entity_name))
    }

    /// Update the listed records. Every id is validated before storage is
    /// touched; matching nothing is a silent success.
    pub async fn update_by_ids(
        &self,
        ids: &[&str],
        patch: FieldMap,
        actor: Option<&Actor>,
    ) -> Result<StatusResponse, CrudError> {
        let uuids = self.parse_ids(ids)?;
        let mut patch = patch;
        Self::stamp(&mut patch, columns::UPDATED_BY, actor);
        self.store
            .update_by_ids(&uuids, &patch)
            .await
            .map_err(|err| self.fail(err))?;
        Ok(StatusResponse::success(Operation::Update, &self.entity_name))
    }

    /// Fetch one live record by id.
    pub async fn get(&self, id: &str, options: &ReadOptions) -> Result<E, CrudError> {
        let uuid = self.parse_id(id)?;
        let record = self
            .store
            .get(uuid, options)
            .await
            .map_err(|err| self.fail(err))?;
        match record {
            Some(record) if record.deleted_at().is_none() => Ok(record),
            _ => Err(self.not_found_by_id()),
        }
    }

    /// Fetch the first live record matching the criteria.
    pub async fn get_one(&self, criteria: Criteria) -> Result<E, CrudError> {
        let criteria = Self::live_only(criteria);
        self.store
            .get_one(&criteria)
            .await
            .map_err(|err| self.fail(err))?
            .ok_or_else(|| self.not_found_condition())
    }

    /// Fetch the listed records, skipping any that are tombstoned. Every id
    /// is validated before storage is touched.
    pub async fn get_by_ids(
        &self,
        ids: &[&str],
        options: &ListOptions,
    ) -> Result<Vec<E>, CrudError> {
        let uuids = self.parse_ids(ids)?;
        let records = self
            .store
            .get_by_ids(&uuids, options)
            .await
            .map_err(|err| self.fail(err))?;
        Ok(records
            .into_iter()
            .filter(|record| record.deleted_at().is_none())
            .collect())
    }

    /// Fetch every live record matching the criteria. With a pagination
    /// window the result is wrapped in an envelope whose total ignores the
    /// window; without one it is the bare list.
    pub async fn get_many(&self, criteria: Criteria) -> Result<ManyRecords<E>, CrudError> {
        let criteria = Self::live_only(criteria);
        let (rows, total) = self
            .store
            .get_many(&criteria)
            .await
            .map_err(|err| self.fail(err))?;
        Ok(match criteria.pagination {
            Some(window) => {
                ManyRecords::Paginated(PaginatedResponse::new(rows, total, Some(window)))
            }
            None => ManyRecords::Plain(rows),
        })
    }

    /// Fetch every live record, with optional sort and window.
    pub async fn get_all(
        &self,
        sort: SortSpec,
        pagination: Option<Page>,
    ) -> Result<ManyRecords<E>, CrudError> {
        let mut criteria = Criteria::new();
        criteria.sort = sort;
        criteria.pagination = pagination;
        self.get_many(criteria).await
    }

    /// Fetch matching live records with any supplied window stripped.
    pub async fn get_without_page(&self, criteria: Criteria) -> Result<Vec<E>, CrudError> {
        let mut criteria = criteria;
        criteria.pagination = None;
        Ok(self.get_many(criteria).await?.into_records())
    }

    /// Count live records matching the criteria.
    pub async fn count(&self, criteria: Criteria) -> Result<u64, CrudError> {
        let criteria = Self::live_only(criteria);
        self.store
            .count(&criteria)
            .await
            .map_err(|err| self.fail(err))
    }

    /// Delete one record by id and return it as it was.
    ///
    /// Soft by default: the record is tombstoned and the deleting principal
    /// stamped best-effort afterwards. With `wipe` the row is removed
    /// physically. Tombstoned records cannot be deleted again softly; they
    /// are already invisible and report 404.
    pub async fn delete(
        &self,
        id: &str,
        actor: Option<&Actor>,
        wipe: bool,
    ) -> Result<E, CrudError> {
        let record = self.get(id, &ReadOptions::none()).await?;
        self.delete_record(record, actor, wipe).await
    }

    /// Delete the first record matching the criteria and return it.
    pub async fn delete_one(
        &self,
        criteria: Criteria,
        actor: Option<&Actor>,
        wipe: bool,
    ) -> Result<E, CrudError> {
        let record = self.get_one(criteria).await?;
        self.delete_record(record, actor, wipe).await
    }

    async fn delete_record(
        &self,
        record: E,
        actor: Option<&Actor>,
        wipe: bool,
    ) -> Result<E, CrudError> {
        let id = record.id();
        let affected = if wipe {
            self.store.hard_delete(id).await
        } else {
            self.store.delete(id).await
        }
        .map_err(|err| self.fail(err))?;
        if affected == 0 {
            return Err(self.not_found_by_id());
        }
        if !wipe {
            if let Some(actor) = actor {
                self.stamp_deleted_by(&[id], actor).await;
                // Return the stamped tombstone when it can be re-read; the
                // pre-delete record is still a correct answer if not.
                if let Ok(Some(stamped)) = self.store.get(id, &ReadOptions::none()).await {
                    return Ok(stamped);
                }
            }
        }
        Ok(record)
    }

    /// Delete every record matching the criteria and return them.
    /// Matching nothing is a 404.
    pub async fn delete_many(
        &self,
        criteria: Criteria,
        actor: Option<&Actor>,
        wipe: bool,
    ) -> Result<Vec<E>, CrudError> {
        let records = self.get_without_page(criteria).await?;
        if records.is_empty() {
            return Err(self.not_found_condition());
        }
        let ids: Vec<Uuid> = records.iter().map(Entity::id).collect();
        if wipe {
            self.store.hard_delete_by_ids(&ids).await
        } else {
            self.store.delete_by_ids(&ids).await
        }
        .map_err(|err| self.fail(err))?;
        if !wipe {
            if let Some(actor) = actor {
                self.stamp_deleted_by(&ids, actor).await;
            }
        }
        Ok(records)
    }

    /// Delete the listed records. Every id is validated before storage is
    /// touched; affecting nothing is a 404.
    pub async fn delete_by_ids(
        &self,
        ids: &[&str],
        actor: Option<&Actor>,
        wipe: bool,
    ) -> Result<StatusResponse, CrudError> {
        let uuids = self.parse_ids(ids)?;
        let affected = if wipe {
            self.store.hard_delete_by_ids(&uuids).await
        } else {
            self.store.delete_by_ids(&uuids).await
        }
        .map_err(|err| self.fail(err))?;
        if affected == 0 {
            return Err(self.not_found_by_id());
        }
        if !wipe {
            if let Some(actor) = actor {
                self.stamp_deleted_by(&uuids, actor).await;
            }
        }
        Ok(StatusResponse::success(Operation::Delete, &self.entity_name))
    }

    /// Run `f` with a service bound to a transaction; commits on `Ok`, rolls
    /// back on `Err`. Reuses the surrounding transaction when already inside
    /// one.
    pub async fn transaction<T, F, Fut>(&self, f: F) -> Result<T, CrudError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, CrudError>>,
    {
        let this = self.clone();
        self.store
            .run_in_transaction(move |scoped| f(this.with_store(scoped)))
            .await
    }

    /// Await a raw storage future, classifying its error through the hook
    /// and classifier.
    pub async fn try_with<T, Fut>(&self, fut: Fut) -> Result<T, CrudError>
    where
        Fut: Future<Output = Result<T, StorageError>>,
    {
        fut.await.map_err(|err| self.fail(err))
    }
}
