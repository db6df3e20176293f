//! Domain error taxonomy and storage-error classifier
//!
//! Raw engine failures ([`StorageError`]) are classified once, at the
//! orchestrator boundary, into [`CrudError`] values carrying an HTTP-style
//! status and a stable machine code of the shape `<ENTITY>_<STATUS>_<REASON>`
//! (`USER_409_EXIST_EMAIL`). The raw driver message rides along in the
//! description for server-side logging and never reaches response messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::ConstraintRegistry;
use crate::response::sentence_case;
use crate::store::{sqlstate, StorageError};

/// A classified data-access failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrudError {
    /// Supplied id is not a UUID v4.
    #[error("Invalid {entity} id, id must be a UUID v4")]
    InvalidId {
        /// Entity the operation targeted.
        entity: String,
    },

    /// No record with the given id.
    #[error("Cannot find a {entity} with given id")]
    NotFoundById {
        /// Entity the operation targeted.
        entity: String,
    },

    /// No record matching the given criteria.
    #[error("Cannot find a {entity} with given condition")]
    NotFoundCondition {
        /// Entity the operation targeted.
        entity: String,
    },

    /// A referenced record does not exist (foreign-key violation).
    ///
    /// Reported as 404 so the status agrees with the
    /// `<ENTITY>_404_<RELATION>_ID` code; some stacks surface this as a 400
    /// validation failure instead.
    #[error("Cannot find a {relation} with given id")]
    NotFoundRelation {
        /// Entity owning the violated constraint.
        entity: String,
        /// The missing related entity.
        relation: String,
        /// Raw driver diagnostic.
        description: Option<String>,
    },

    /// A required field was omitted and has no default.
    #[error("No default value for {entity} {field}")]
    MissingDefault {
        /// Entity the operation targeted.
        entity: String,
        /// Field without a value.
        field: String,
        /// Raw driver diagnostic.
        description: Option<String>,
    },

    /// A unique constraint rejected the record.
    #[error("{} with given {field} already exists", sentence_case(.entity))]
    Duplicate {
        /// Entity the violated constraint guards.
        entity: String,
        /// Field the violated constraint guards.
        field: String,
        /// Raw driver diagnostic.
        description: Option<String>,
    },

    /// The query referenced a field the entity does not have.
    #[error("Unknown query field for {entity}")]
    UnknownField {
        /// Entity the operation targeted.
        entity: String,
        /// Raw driver diagnostic.
        description: Option<String>,
    },

    /// Anything the classifier could not map; logged before surfacing.
    #[error("Unexpected error occurred")]
    Unclassified {
        /// Raw driver diagnostic.
        description: Option<String>,
    },
}

/// Raw failures crossing an unclassified boundary (transaction begin and
/// commit) degrade to the generic 500; operation paths classify instead.
impl From<StorageError> for CrudError {
    fn from(err: StorageError) -> Self {
        CrudError::Unclassified {
            description: Some(err.to_string()),
        }
    }
}

impl CrudError {
    /// HTTP-style status for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            CrudError::InvalidId { .. }
            | CrudError::MissingDefault { .. }
            | CrudError::UnknownField { .. } => 400,
            CrudError::NotFoundById { .. }
            | CrudError::NotFoundCondition { .. }
            | CrudError::NotFoundRelation { .. } => 404,
            CrudError::Duplicate { .. } => 409,
            CrudError::Unclassified { .. } => 500,
        }
    }

    /// Stable machine code, `<ENTITY>_<STATUS>_<REASON>`.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            CrudError::InvalidId { entity } => format!("{}_400_ID", upper_snake(entity)),
            CrudError::NotFoundById { entity } => format!("{}_404_ID", upper_snake(entity)),
            CrudError::NotFoundCondition { entity } => {
                format!("{}_404_CONDITION", upper_snake(entity))
            }
            CrudError::NotFoundRelation {
                entity, relation, ..
            } => format!("{}_404_{}_ID", upper_snake(entity), upper_snake(relation)),
            CrudError::MissingDefault { entity, field, .. } => {
                format!("{}_400_NO_DEFAULT_{}", upper_snake(entity), upper_snake(field))
            }
            CrudError::Duplicate { entity, field, .. } => {
                format!("{}_409_EXIST_{}", upper_snake(entity), upper_snake(field))
            }
            CrudError::UnknownField { entity, .. } => {
                format!("{}_400_QUERY", upper_snake(entity))
            }
            CrudError::Unclassified { .. } => "E_500".to_string(),
        }
    }

    /// Response payload for this failure.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: self.status(),
            code: self.code(),
            message: self.to_string(),
            description: self.description().map(str::to_string),
        }
    }

    fn description(&self) -> Option<&str> {
        match self {
            CrudError::NotFoundRelation { description, .. }
            | CrudError::MissingDefault { description, .. }
            | CrudError::Duplicate { description, .. }
            | CrudError::UnknownField { description, .. }
            | CrudError::Unclassified { description } => description.as_deref(),
            _ => None,
        }
    }
}

/// Serializable error payload.
///
/// `description` carries the raw driver diagnostic and is skipped during
/// serialization; it is for server-side logging, not clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP-style status.
    pub status: u16,
    /// Stable machine code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Raw driver diagnostic, server-side only.
    #[serde(skip_serializing, default)]
    pub description: Option<String>,
}

/// Classify a raw storage failure for an operation on `entity`.
///
/// `unique_field` is the fallback reported for unique violations whose
/// constraint name does not resolve through the registry.
#[must_use]
pub fn classify(
    err: StorageError,
    entity: &str,
    unique_field: Option<&str>,
    registry: &ConstraintRegistry,
) -> CrudError {
    let description = Some(err.message.clone());
    match err.code.as_deref() {
        Some(sqlstate::UNDEFINED_COLUMN) => CrudError::UnknownField {
            entity: entity.to_string(),
            description,
        },
        Some(sqlstate::NOT_NULL_VIOLATION) => CrudError::MissingDefault {
            entity: entity.to_string(),
            field: parse_quoted_field(&err.message).unwrap_or_else(|| "field".to_string()),
            description,
        },
        Some(sqlstate::UNIQUE_VIOLATION) => {
            match err.constraint.as_deref().and_then(|c| registry.resolve(c)) {
                Some(target) => CrudError::Duplicate {
                    entity: target.entity,
                    field: target.field,
                    description,
                },
                None => CrudError::Duplicate {
                    entity: entity.to_string(),
                    field: unique_field.unwrap_or("id").to_string(),
                    description,
                },
            }
        }
        Some(sqlstate::FOREIGN_KEY_VIOLATION) => {
            match err.constraint.as_deref().and_then(|c| registry.resolve(c)) {
                Some(target) => CrudError::NotFoundRelation {
                    entity: target.entity,
                    relation: target.field,
                    description,
                },
                None => {
                    tracing::error!(error = %err, "unresolvable foreign key violation");
                    CrudError::Unclassified { description }
                }
            }
        }
        _ => {
            tracing::error!(error = %err, "unclassified storage error");
            CrudError::Unclassified { description }
        }
    }
}

/// Pull the first quoted token out of a driver message, e.g. the column name
/// in `null value in column "name" of relation "users" ...`.
fn parse_quoted_field(message: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let mut parts = message.splitn(3, quote);
        parts.next()?;
        if let Some(field) = parts.next() {
            if parts.next().is_some() && !field.is_empty() {
                return Some(field.to_string());
            }
        }
    }
    None
}

/// `profile_name` / `profileName` / `profile name` → `PROFILE_NAME`.
pub(crate) fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == ' ' || c == '-' || c == '_' {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        } else if c.is_uppercase() && prev_lower {
            out.push('_');
            out.extend(c.to_uppercase());
            prev_lower = false;
        } else {
            out.extend(c.to_uppercase());
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}
