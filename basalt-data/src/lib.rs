//! # basalt-data
//!
//! A generic data-access layer giving every domain record type a uniform set
//! of CRUD operations over a relational persistence engine:
//!
//! - **Criteria model** — queries described as composable fragments (exact,
//!   negated, fuzzy, list filters) over one tree shape, composed with fixed
//!   merge order and fuzzy-OR branching ([`criteria`]).
//! - **Record store** — a repository generic over entity type and backend,
//!   with soft/hard deletes, affected-count updates, and unit-of-work
//!   transactions scoped to the call chain ([`store`]).
//! - **CRUD orchestrator** — id validation, audit stamping, soft-delete
//!   visibility, response envelopes, and error classification in one place
//!   ([`service`]).
//! - **Error taxonomy** — raw driver failures classified into stable
//!   `<ENTITY>_<STATUS>_<REASON>` codes ([`error`], [`registry`]).
//!
//! Two backends ship: [`store::memory::MemoryBackend`], an in-memory engine
//! with real transactional semantics, and [`store::pg::PgBackend`] over
//! PostgreSQL via sqlx.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use basalt_data::prelude::*;
//! use chrono::{DateTime, Utc};
//! use uuid::Uuid;
//!
//! #[derive(Debug, Clone)]
//! struct User {
//!     id: Uuid,
//!     email: String,
//!     deleted_at: Option<DateTime<Utc>>,
//! }
//!
//! impl Entity for User {
//!     const TABLE: &'static str = "users";
//!
//!     fn id(&self) -> Uuid {
//!         self.id
//!     }
//!
//!     fn deleted_at(&self) -> Option<DateTime<Utc>> {
//!         self.deleted_at
//!     }
//! }
//!
//! impl FromFields for User {
//!     fn from_fields(fields: &FieldMap) -> Result<Self, StorageError> {
//!         Ok(Self {
//!             id: fields
//!                 .get(columns::ID)
//!                 .and_then(Value::as_uuid)
//!                 .ok_or_else(|| StorageError::message("users row without id"))?,
//!             email: fields
//!                 .get("email")
//!                 .and_then(|v| v.as_str().map(str::to_string))
//!                 .unwrap_or_default(),
//!             deleted_at: fields.get(columns::DELETED_AT).and_then(Value::as_datetime),
//!         })
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), CrudError> {
//!     let store = RecordStore::new(Arc::new(MemoryBackend::new()));
//!     let users = CrudService::<User, _>::new(store, "user");
//!
//!     let user = users
//!         .save(
//!             FieldMap::new().set("email", "a@example.com"),
//!             &ReadOptions::none(),
//!             None,
//!         )
//!         .await?;
//!
//!     let found = users
//!         .get_one(Criteria::new().search("email", "example"))
//!         .await?;
//!     assert_eq!(found.id(), user.id());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod criteria;
pub mod entity;
pub mod error;
pub mod registry;
pub mod relations;
pub mod response;
pub mod service;
pub mod store;

/// Common imports for working with the crate.
pub mod prelude {
    pub use crate::config::{DataConfig, DatabaseConfig};
    pub use crate::criteria::{
        Criteria, CriteriaNode, CriteriaTree, EffectiveFilter, EffectiveQuery, Page, SortOrder,
        SortSpec, Value,
    };
    pub use crate::entity::{columns, Actor, Entity, FieldMap, FromFields};
    pub use crate::error::{classify, CrudError, ErrorResponse};
    pub use crate::registry::{ConstraintRegistry, ConstraintTarget};
    pub use crate::relations::RelationLoader;
    pub use crate::response::{Operation, PaginatedResponse, StatusResponse};
    pub use crate::service::{CrudService, ErrorHook, ManyRecords};
    pub use crate::store::memory::MemoryBackend;
    pub use crate::store::pg::PgBackend;
    pub use crate::store::{
        ListOptions, OpContext, ReadOptions, RecordStore, StorageBackend, StorageError, TxnId,
        TxnManager,
    };
}
