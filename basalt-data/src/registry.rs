//! Constraint registry
//!
//! Maps database constraint names to the entity and field they guard, so
//! unique and foreign-key violations can be reported in domain terms. Names
//! that were not registered explicitly still resolve when they follow the
//! `<KIND>_<entity>_<field>` naming convention (`UNIQUE_user_email`,
//! `FK_post_author_id`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What a constraint guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintTarget {
    /// Entity (table) the constraint belongs to.
    pub entity: String,
    /// Field the constraint guards.
    pub field: String,
}

impl ConstraintTarget {
    /// Build a target.
    #[must_use]
    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
        }
    }
}

/// Constraint prefixes accepted by the naming-convention fallback.
const KNOWN_PREFIXES: [&str; 5] = ["UNIQUE", "UQ", "IDX", "FK", "REL"];

/// Registry of constraint names.
#[derive(Debug, Clone, Default)]
pub struct ConstraintRegistry {
    entries: HashMap<String, ConstraintTarget>,
}

impl ConstraintRegistry {
    /// Empty registry; resolution falls back to name parsing only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured entries.
    #[must_use]
    pub fn from_map(entries: HashMap<String, ConstraintTarget>) -> Self {
        Self { entries }
    }

    /// Builder-style registration.
    #[must_use]
    pub fn register(
        mut self,
        constraint: impl Into<String>,
        entity: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.entries
            .insert(constraint.into(), ConstraintTarget::new(entity, field));
        self
    }

    /// Resolve a constraint name to its target.
    ///
    /// Explicit registrations win; otherwise the name is parsed against the
    /// `<KIND>_<entity>_<field>` convention. Returns `None` for names that
    /// are neither registered nor conventional.
    #[must_use]
    pub fn resolve(&self, constraint: &str) -> Option<ConstraintTarget> {
        if let Some(target) = self.entries.get(constraint) {
            return Some(target.clone());
        }
        let mut parts = constraint.splitn(3, '_');
        let prefix = parts.next()?;
        if !KNOWN_PREFIXES.contains(&prefix.to_uppercase().as_str()) {
            return None;
        }
        let entity = parts.next()?;
        let field = parts.next()?;
        if entity.is_empty() || field.is_empty() {
            return None;
        }
        Some(ConstraintTarget::new(entity, field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_registration_wins() {
        let registry =
            ConstraintRegistry::new().register("users_email_key", "user", "email");
        assert_eq!(
            registry.resolve("users_email_key"),
            Some(ConstraintTarget::new("user", "email"))
        );
    }

    #[test]
    fn conventional_names_parse() {
        let registry = ConstraintRegistry::new();
        assert_eq!(
            registry.resolve("UNIQUE_user_email"),
            Some(ConstraintTarget::new("user", "email"))
        );
        assert_eq!(
            registry.resolve("FK_post_author_id"),
            Some(ConstraintTarget::new("post", "author_id"))
        );
    }

    #[test]
    fn unconventional_names_do_not_resolve() {
        let registry = ConstraintRegistry::new();
        assert_eq!(registry.resolve("users_pkey"), None);
        assert_eq!(registry.resolve("CHECK_user_age"), None);
        assert_eq!(registry.resolve("UNIQUE_"), None);
    }
}
