//! Persistence-engine contract
//!
//! The record store and orchestrator are generic over a backend implementing
//! these traits. Backends execute composed queries; they never classify
//! failures into the domain taxonomy, they only report what the engine said.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::criteria::{EffectiveFilter, EffectiveQuery};
use crate::entity::{Entity, FieldMap};

/// SQLSTATE codes the classifier recognizes.
pub mod sqlstate {
    /// Not-null constraint violated (missing default for a field).
    pub const NOT_NULL_VIOLATION: &str = "23502";
    /// Foreign-key constraint violated.
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    /// Unique constraint violated.
    pub const UNIQUE_VIOLATION: &str = "23505";
    /// Query referenced a column that does not exist.
    pub const UNDEFINED_COLUMN: &str = "42703";
}

/// A raw storage failure, exactly as the engine reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageError {
    /// Engine error code (SQLSTATE for SQL backends), if one was reported.
    pub code: Option<String>,
    /// Raw diagnostic message.
    pub message: String,
    /// Name of the violated constraint, if the engine named one.
    pub constraint: Option<String>,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "storage error [{code}]: {}", self.message),
            None => write!(f, "storage error: {}", self.message),
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    /// A failure with an engine code.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            constraint: None,
        }
    }

    /// A failure without an engine code (connection loss, decode failure).
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            constraint: None,
        }
    }

    /// Attach the violated constraint's name.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }
}

/// Opaque handle to an open transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnId(Uuid);

impl TxnId {
    /// Mint a fresh handle.
    #[must_use]
    pub fn next() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Per-call-chain operation context.
///
/// Carries the transaction handle, if the call chain runs inside one. The
/// context is a value cloned into scoped stores, never shared mutable state,
/// so concurrent call chains cannot observe each other's transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpContext {
    /// Transaction this call chain is bound to, if any.
    pub txn: Option<TxnId>,
}

impl OpContext {
    /// Context outside any transaction.
    #[must_use]
    pub const fn detached() -> Self {
        Self { txn: None }
    }

    /// Context bound to an open transaction.
    #[must_use]
    pub const fn in_txn(txn: TxnId) -> Self {
        Self { txn: Some(txn) }
    }
}

/// Transaction lifecycle contract.
pub trait TxnManager: Send + Sync {
    /// Open a transaction and return its handle.
    fn begin(&self) -> impl Future<Output = Result<TxnId, StorageError>> + Send;

    /// Commit the transaction behind the handle.
    fn commit(&self, txn: TxnId) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Roll back the transaction behind the handle.
    fn rollback(&self, txn: TxnId) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Row-level persistence contract for one entity type.
///
/// Backends stamp `id`, `created_at`, and `updated_at` at insert when the
/// caller did not supply them, and refresh `updated_at` on every successful
/// update. Soft deletes set `deleted_at` and nothing else. Read operations
/// return tombstoned rows too; soft-delete visibility is the orchestrator's
/// concern.
pub trait StorageBackend<E: Entity>: TxnManager {
    /// Insert one row and return it as stored.
    fn insert(
        &self,
        ctx: &OpContext,
        row: FieldMap,
    ) -> impl Future<Output = Result<E, StorageError>> + Send;

    /// Insert several rows, preserving order.
    fn insert_many(
        &self,
        ctx: &OpContext,
        rows: Vec<FieldMap>,
    ) -> impl Future<Output = Result<Vec<E>, StorageError>> + Send;

    /// First row matching the query, honoring its sort.
    fn select_one(
        &self,
        ctx: &OpContext,
        query: &EffectiveQuery,
    ) -> impl Future<Output = Result<Option<E>, StorageError>> + Send;

    /// All rows matching the query, honoring sort and pagination.
    fn select_many(
        &self,
        ctx: &OpContext,
        query: &EffectiveQuery,
    ) -> impl Future<Output = Result<Vec<E>, StorageError>> + Send;

    /// Number of rows matching the filter; pagination never applies.
    fn count(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Apply a patch to matching rows; returns the affected-row count.
    fn update_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
        patch: &FieldMap,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Stamp `deleted_at` on matching rows; returns the affected-row count.
    fn soft_delete_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Physically remove matching rows; returns the affected-row count.
    fn hard_delete_where(
        &self,
        ctx: &OpContext,
        filter: &EffectiveFilter,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;
}

/// Stamp identity and audit columns a backend owes every inserted row,
/// leaving caller-supplied values alone.
pub(crate) fn stamp_insert(mut row: FieldMap) -> FieldMap {
    use crate::entity::columns;
    let now = chrono::Utc::now();
    if !row.contains(columns::ID) {
        row.insert(columns::ID, Uuid::new_v4());
    }
    if !row.contains(columns::CREATED_AT) {
        row.insert(columns::CREATED_AT, now);
    }
    if !row.contains(columns::UPDATED_AT) {
        row.insert(columns::UPDATED_AT, now);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_display_includes_code() {
        let err = StorageError::new(sqlstate::UNIQUE_VIOLATION, "duplicate key");
        assert_eq!(err.to_string(), "storage error [23505]: duplicate key");
        let bare = StorageError::message("connection reset");
        assert_eq!(bare.to_string(), "storage error: connection reset");
    }

    #[test]
    fn contexts_compare_by_transaction() {
        let txn = TxnId::next();
        assert_eq!(OpContext::detached(), OpContext::default());
        assert_eq!(OpContext::in_txn(txn).txn, Some(txn));
        assert_ne!(OpContext::in_txn(txn), OpContext::detached());
    }
}
