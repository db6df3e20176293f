//! PostgreSQL backend
//!
//! Executes composed queries against Postgres through sqlx. Statements are
//! rendered dynamically (see [`sql`]); open transactions are parked in a map
//! keyed by [`TxnId`], so only the call chain holding a handle can reach its
//! transaction. The relation list on queries is not hydrated here — eager
//! loading of typed relations belongs to entity-specific
//! [`RelationLoader`](crate::relations::RelationLoader) implementations.

mod sql;

use std::collections::HashMap;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::config::DatabaseConfig;
use crate::criteria::{EffectiveFilter, EffectiveQuery};
use crate::entity::{Entity, FieldMap};
use crate::store::backend::{
    stamp_insert, OpContext, StorageBackend, StorageError, TxnId, TxnManager,
};

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db) => {
                let base = match db.code() {
                    Some(code) => StorageError::new(code.to_string(), db.message()),
                    None => StorageError::message(db.message()),
                };
                match db.constraint() {
                    Some(constraint) => base.with_constraint(constraint),
                    None => base,
                }
            }
            None => StorageError::message(err.to_string()),
        }
    }
}

/// Postgres persistence engine.
pub struct PgBackend {
    pool: PgPool,
    txns: Mutex<HashMap<TxnId, Transaction<'static, Postgres>>>,
}

impl PgBackend {
    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            txns: Mutex::new(HashMap::new()),
        }
    }

    /// Connect per the configuration, retrying with a fixed delay until the
    /// database accepts connections or the retry budget runs out.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let options = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));
            match options.connect(&config.url).await {
                Ok(pool) => {
                    tracing::debug!(attempt, "database pool established");
                    return Ok(Self::from_pool(pool));
                }
                Err(err) if attempt < config.max_retries => {
                    tracing::warn!(
                        attempt,
                        max_retries = config.max_retries,
                        error = %err,
                        "database connection failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(config.retry_delay_secs)).await;
                }
                Err(err) => return Err(StorageError::from(err)),
            }
        }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_optional<E>(
        &self,
        ctx: &OpContext,
        mut qb: sqlx::QueryBuilder<'_, Postgres>,
    ) -> Result<Option<E>, StorageError>
    where
        E: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = qb.build_query_as::<E>();
        match ctx.txn {
            Some(txn) => {
                let mut txns = self.txns.lock().await;
                let tx = txns
                    .get_mut(&txn)
                    .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
                Ok(query.fetch_optional(&mut **tx).await?)
            }
            None => Ok(query.fetch_optional(&self.pool).await?),
        }
    }

    async fn fetch_all<E>(
        &self,
        ctx: &OpContext,
        mut qb: sqlx::QueryBuilder<'_, Postgres>,
    ) -> Result<Vec<E>, StorageError>
    where
        E: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let query = qb.build_query_as::<E>();
        match ctx.txn {
            Some(txn) => {
                let mut txns = self.txns.lock().await;
                let tx = txns
                    .get_mut(&txn)
                    .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
                Ok(query.fetch_all(&mut **tx).await?)
            }
            None => Ok(query.fetch_all(&self.pool).await?),
        }
    }

    async fn execute(
        &self,
        ctx: &OpContext,
        mut qb: sqlx::QueryBuilder<'_, Postgres>,
    ) -> Result<u64, StorageError> {
        let query = qb.build();
        match ctx.txn {
            Some(txn) => {
                let mut txns = self.txns.lock().await;
                let tx = txns
                    .get_mut(&txn)
                    .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
                Ok(query.execute(&mut **tx).await?.rows_affected())
            }
            None => Ok(query.execute(&self.pool).await?.rows_affected()),
        }
    }
}

impl TxnManager for PgBackend {
    async fn begin(&self) -> Result<TxnId, StorageError> {
        let tx = self.pool.begin().await?;
        let txn = TxnId::next();
        self.txns.lock().await.insert(txn, tx);
        Ok(txn)
    }

    async fn commit(&self, txn: TxnId) -> Result<(), StorageError> {
        let tx = self
            .txns
            .lock()
            .await
            .remove(&txn)
            .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, txn: TxnId) -> Result<(), StorageError> {
        let tx = self
            .txns
            .lock()
            .await
            .remove(&txn)
            .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
        Ok(tx.rollback().await?)
    }
}

impl<E> StorageBackend<E> for PgBackend
where
    E: Entity + for<'r> FromRow<'r, PgRow>,
{
    async fn insert(&self, ctx: &OpContext, row: FieldMap) -> Result<E, StorageError> {
        let row = stamp_insert(row);
        self.fetch_optional(ctx, sql::insert(E::TABLE, &row))
            .await?
            .ok_or_else(|| StorageError::message("insert returned no row"))
    }

    async fn insert_many(
        &self,
        ctx: &OpContext,
        rows: Vec<FieldMap>,
    ) -> Result<Vec<E>, StorageError> {
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            inserted.push(StorageBackend::insert(self, ctx, row).await?);
        }
        Ok(inserted)
    }

    async fn select_one(
        &self,
        ctx: &OpContext,
        query: &EffectiveQuery,
    ) -> Result<Option<E>, StorageError> {
        let mut single = query.clone();
        single.page = None;
        let mut qb = sql::select(E::TABLE, &single);
        qb.push(" LIMIT 1");
        self.fetch_optional(ctx, qb).await
    }

    async fn select_many(
        &self,
        ctx: &OpContext,
        query: &EffectiveQuery,
    ) -> Result<Vec<E>, StorageError> {
        self.fetch_all(ctx, sql::select(E::TABLE, query)).await
    }

    async fn count(&self, ctx: &OpContext, filter: &EffectiveFilter) -> Result<u64, StorageError> {
        let mut qb = sql::count(E::TABLE, filter);
        let query = qb.build_query_scalar::<i64>();
        let total = match ctx.txn {
            Some(txn) => {
                let mut txns = self.txns.lock().await;
                let tx = txns
                    .get_mut(&txn)
                    .ok_or_else(|| StorageError::message("unknown transaction handle"))?;
                query.fetch_one(&mut **tx).await?
            }
            None => query.fetch_one(&self.pool).await?,
        };
        Ok(total.max(0) as u64)
    }

    async fn update_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
        patch: &FieldMap,
    ) -> Result<u64, StorageError> {
        self.execute(ctx, sql::update(E::TABLE, filter, patch)).await
    }

    async fn soft_delete_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
    ) -> Result<u64, StorageError> {
        self.execute(ctx, sql::soft_delete(E::TABLE, filter)).await
    }

    async fn hard_delete_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
    ) -> Result<u64, StorageError> {
        self.execute(ctx, sql::hard_delete(E::TABLE, filter)).await
    }
}
