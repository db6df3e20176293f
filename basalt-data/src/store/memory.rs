//! In-memory backend
//!
//! Reference implementation of the persistence-engine contract, used by the
//! test suites and handy for prototyping. Rows are stored as field maps;
//! transactions snapshot the whole table set, so commit and rollback are
//! genuinely atomic. One transaction at a time is supported; opening a second
//! while one is pending fails, and detached writes made while a snapshot is
//! open are lost if it commits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::criteria::{
    CriteriaNode, CriteriaTree, EffectiveFilter, EffectiveQuery, SortOrder, SortTree, Value,
};
use crate::entity::{columns, Entity, FieldMap, FromFields};
use crate::store::backend::{
    stamp_insert, OpContext, StorageBackend, StorageError, TxnId, TxnManager,
};

type Tables = HashMap<String, Vec<FieldMap>>;

#[derive(Default)]
struct MemState {
    tables: Tables,
    txns: HashMap<TxnId, Tables>,
}

impl MemState {
    fn tables_for(&mut self, ctx: &OpContext) -> Result<&mut Tables, StorageError> {
        match ctx.txn {
            Some(txn) => self
                .txns
                .get_mut(&txn)
                .ok_or_else(|| StorageError::message("unknown transaction handle")),
            None => Ok(&mut self.tables),
        }
    }

    fn rows(&mut self, ctx: &OpContext, table: &str) -> Result<&mut Vec<FieldMap>, StorageError> {
        Ok(self.tables_for(ctx)?.entry(table.to_string()).or_default())
    }
}

/// In-memory persistence engine.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemState>,
    ops: AtomicU64,
}

impl MemoryBackend {
    /// Empty backend with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row operations executed so far. Test instrumentation for
    /// asserting that validation short-circuits before storage is touched.
    #[must_use]
    pub fn operations(&self) -> u64 {
        self.ops.load(AtomicOrdering::SeqCst)
    }

    fn bump(&self) {
        self.ops.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

impl TxnManager for MemoryBackend {
    async fn begin(&self) -> Result<TxnId, StorageError> {
        let mut state = self.state.lock().await;
        if !state.txns.is_empty() {
            return Err(StorageError::message(
                "a transaction is already open, this backend supports one at a time",
            ));
        }
        let txn = TxnId::next();
        let snapshot = state.tables.clone();
        state.txns.insert(txn, snapshot);
        Ok(txn)
    }

    async fn commit(&self, txn: TxnId) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        let snapshot = state
            .txns
            .remove(&txn)
            .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
        state.tables = snapshot;
        Ok(())
    }

    async fn rollback(&self, txn: TxnId) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state
            .txns
            .remove(&txn)
            .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
        Ok(())
    }
}

impl<E> StorageBackend<E> for MemoryBackend
where
    E: Entity + FromFields,
{
    async fn insert(&self, ctx: &OpContext, row: FieldMap) -> Result<E, StorageError> {
        self.bump();
        let row = stamp_insert(row);
        let entity = E::from_fields(&row)?;
        let mut state = self.state.lock().await;
        state.rows(ctx, E::TABLE)?.push(row);
        Ok(entity)
    }

    async fn insert_many(&self, ctx: &OpContext, rows: Vec<FieldMap>) -> Result<Vec<E>, StorageError> {
        self.bump();
        let mut inserted = Vec::with_capacity(rows.len());
        let mut state = self.state.lock().await;
        let table = state.rows(ctx, E::TABLE)?;
        for row in rows {
            let row = stamp_insert(row);
            inserted.push(E::from_fields(&row)?);
            table.push(row);
        }
        Ok(inserted)
    }

    async fn select_one(
        &self,
        ctx: &OpContext,
        query: &EffectiveQuery,
    ) -> Result<Option<E>, StorageError> {
        self.bump();
        let mut state = self.state.lock().await;
        let rows = state.rows(ctx, E::TABLE)?;
        let mut matched: Vec<&FieldMap> = rows
            .iter()
            .filter(|row| matches_filter(row, &query.filter))
            .collect();
        if let Some(sort) = &query.sort {
            sort_rows(&mut matched, sort);
        }
        matched.first().map(|row| E::from_fields(row)).transpose()
    }

    async fn select_many(
        &self,
        ctx: &OpContext,
        query: &EffectiveQuery,
    ) -> Result<Vec<E>, StorageError> {
        self.bump();
        let mut state = self.state.lock().await;
        let rows = state.rows(ctx, E::TABLE)?;
        let mut matched: Vec<&FieldMap> = rows
            .iter()
            .filter(|row| matches_filter(row, &query.filter))
            .collect();
        if let Some(sort) = &query.sort {
            sort_rows(&mut matched, sort);
        }
        let window: Box<dyn Iterator<Item = &&FieldMap>> = match query.page {
            Some(page) => Box::new(
                matched
                    .iter()
                    .skip(page.skip as usize)
                    .take(page.take as usize),
            ),
            None => Box::new(matched.iter()),
        };
        window.map(|row| E::from_fields(row)).collect()
    }

    async fn count(&self, ctx: &OpContext, filter: &EffectiveFilter) -> Result<u64, StorageError> {
        self.bump();
        let mut state = self.state.lock().await;
        let rows = state.rows(ctx, E::TABLE)?;
        Ok(rows.iter().filter(|row| matches_filter(row, filter)).count() as u64)
    }

    async fn update_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
        patch: &FieldMap,
    ) -> Result<u64, StorageError> {
        self.bump();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let rows = state.rows(ctx, E::TABLE)?;
        let mut affected = 0;
        for row in rows.iter_mut() {
            if matches_filter(row, filter) {
                row.merge(patch);
                row.insert(columns::UPDATED_AT, now);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn soft_delete_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
    ) -> Result<u64, StorageError> {
        self.bump();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let rows = state.rows(ctx, E::TABLE)?;
        let mut affected = 0;
        for row in rows.iter_mut() {
            if matches_filter(row, filter) {
                row.insert(columns::DELETED_AT, now);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn hard_delete_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
    ) -> Result<u64, StorageError> {
        self.bump();
        let mut state = self.state.lock().await;
        let rows = state.rows(ctx, E::TABLE)?;
        let before = rows.len();
        rows.retain(|row| !matches_filter(row, filter));
        Ok((before - rows.len()) as u64)
    }
}

fn row_value<'a>(row: &'a FieldMap, path: &str) -> &'a Value {
    row.get(path).unwrap_or(&Value::Null)
}

fn matches_filter(row: &FieldMap, filter: &EffectiveFilter) -> bool {
    match filter {
        EffectiveFilter::One(tree) => matches_tree(row, tree, ""),
        EffectiveFilter::Any(trees) => trees.iter().any(|tree| matches_tree(row, tree, "")),
        EffectiveFilter::Ids(ids) => row_value(row, columns::ID)
            .as_uuid()
            .is_some_and(|id| ids.contains(&id)),
    }
}

fn matches_tree(row: &FieldMap, tree: &CriteriaTree, prefix: &str) -> bool {
    tree.iter().all(|(field, node)| {
        let path = if prefix.is_empty() {
            field.clone()
        } else {
            format!("{prefix}.{field}")
        };
        match node {
            CriteriaNode::Value(expected) => row_value(row, &path) == expected,
            CriteriaNode::Not(expected) => row_value(row, &path) != expected,
            CriteriaNode::Contains(term) => {
                let stored = row_value(row, &path);
                !stored.is_null()
                    && stored
                        .to_string()
                        .to_lowercase()
                        .contains(&term.to_lowercase())
            }
            CriteriaNode::Nested(sub) => matches_tree(row, sub, &path),
        }
    })
}

fn sort_rows(rows: &mut [&FieldMap], tree: &SortTree) {
    let keys = crate::criteria::flatten_sort(tree);
    rows.sort_by(|a, b| {
        for (path, order) in &keys {
            let ordering = compare_values(row_value(a, path), row_value(b, path));
            let ordering = match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Uuid(x), Value::Uuid(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (x, y) => x.to_string().cmp(&y.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Criteria, Page};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: Uuid,
        title: String,
        deleted_at: Option<DateTime<Utc>>,
    }

    impl Entity for Note {
        const TABLE: &'static str = "notes";

        fn id(&self) -> Uuid {
            self.id
        }

        fn deleted_at(&self) -> Option<DateTime<Utc>> {
            self.deleted_at
        }
    }

    impl FromFields for Note {
        fn from_fields(fields: &FieldMap) -> Result<Self, StorageError> {
            Ok(Self {
                id: fields
                    .get(columns::ID)
                    .and_then(Value::as_uuid)
                    .ok_or_else(|| StorageError::message("notes row without id"))?,
                title: fields
                    .get("title")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                deleted_at: fields
                    .get(columns::DELETED_AT)
                    .and_then(Value::as_datetime),
            })
        }
    }

    fn note_row(title: &str) -> FieldMap {
        FieldMap::new().set("title", title)
    }

    #[tokio::test]
    async fn insert_stamps_identity_and_audit_columns() {
        let backend = MemoryBackend::new();
        let ctx = OpContext::detached();
        let note: Note = backend.insert(&ctx, note_row("first")).await.unwrap();
        assert!(!note.id.is_nil());
        assert_eq!(note.title, "first");
        assert_eq!(note.deleted_at, None);
    }

    #[tokio::test]
    async fn select_many_applies_sort_and_window() {
        let backend = MemoryBackend::new();
        let ctx = OpContext::detached();
        for title in ["c", "a", "b", "d"] {
            let _: Note = backend.insert(&ctx, note_row(title)).await.unwrap();
        }
        let query = Criteria::new()
            .sort_by("title", SortOrder::Asc)
            .paginate(Page::new(1, 2))
            .compose();
        let notes: Vec<Note> = backend.select_many(&ctx, &query).await.unwrap();
        let titles: Vec<&str> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["b", "c"]);
    }

    #[tokio::test]
    async fn count_ignores_pagination() {
        let backend = MemoryBackend::new();
        let ctx = OpContext::detached();
        for title in ["a", "b", "c"] {
            let _: Note = backend.insert(&ctx, note_row(title)).await.unwrap();
        }
        let query = Criteria::new().paginate(Page::new(0, 1)).compose();
        let total =
            <MemoryBackend as StorageBackend<Note>>::count(&backend, &ctx, &query.filter)
                .await
                .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn contains_matches_case_insensitively() {
        let backend = MemoryBackend::new();
        let ctx = OpContext::detached();
        let _: Note = backend.insert(&ctx, note_row("Shopping List")).await.unwrap();
        let _: Note = backend.insert(&ctx, note_row("notes")).await.unwrap();
        let query = Criteria::new().search("title", "shop").compose();
        let found: Vec<Note> = backend.select_many(&ctx, &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Shopping List");
    }

    #[tokio::test]
    async fn soft_delete_stamps_tombstone() {
        let backend = MemoryBackend::new();
        let ctx = OpContext::detached();
        let note: Note = backend.insert(&ctx, note_row("gone soon")).await.unwrap();
        let affected = <MemoryBackend as StorageBackend<Note>>::soft_delete_where(
            &backend,
            &ctx,
            &EffectiveFilter::Ids(vec![note.id]),
        )
        .await
        .unwrap();
        assert_eq!(affected, 1);
        let reread: Option<Note> = backend
            .select_one(&ctx, &EffectiveQuery::by_ids(vec![note.id], Vec::new()))
            .await
            .unwrap();
        assert!(reread.unwrap().deleted_at.is_some());
    }

    #[tokio::test]
    async fn rollback_discards_transactional_writes() {
        let backend = MemoryBackend::new();
        let detached = OpContext::detached();
        let txn = backend.begin().await.unwrap();
        let ctx = OpContext::in_txn(txn);
        let _: Note = backend.insert(&ctx, note_row("uncommitted")).await.unwrap();
        backend.rollback(txn).await.unwrap();
        let total = <MemoryBackend as StorageBackend<Note>>::count(
            &backend,
            &detached,
            &EffectiveFilter::all(),
        )
        .await
        .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn commit_publishes_transactional_writes() {
        let backend = MemoryBackend::new();
        let detached = OpContext::detached();
        let txn = backend.begin().await.unwrap();
        let ctx = OpContext::in_txn(txn);
        let _: Note = backend.insert(&ctx, note_row("committed")).await.unwrap();
        backend.commit(txn).await.unwrap();
        let total = <MemoryBackend as StorageBackend<Note>>::count(
            &backend,
            &detached,
            &EffectiveFilter::all(),
        )
        .await
        .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn second_open_transaction_is_rejected() {
        let backend = MemoryBackend::new();
        let txn = backend.begin().await.unwrap();
        assert!(backend.begin().await.is_err());
        backend.rollback(txn).await.unwrap();
        assert!(backend.begin().await.is_ok());
    }

    #[tokio::test]
    async fn stale_transaction_handle_is_rejected() {
        let backend = MemoryBackend::new();
        let ctx = OpContext::in_txn(TxnId::next());
        let result: Result<Note, _> = backend.insert(&ctx, note_row("nowhere")).await;
        assert!(result.is_err());
    }
}
