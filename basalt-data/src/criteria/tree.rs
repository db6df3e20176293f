//! Criteria trees
//!
//! A criteria tree mirrors the shape of the entity it filters: leaves are
//! comparisons against a column, interior nodes descend into a related
//! record. Exact, negated, and fuzzy fragments all share this one shape; the
//! fragment kind decides how leaves are wrapped when the fragments are merged
//! into the effective filter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::criteria::Value;
use crate::entity::FieldMap;

/// Field-keyed criteria mapping with deterministic iteration order.
pub type CriteriaTree = BTreeMap<String, CriteriaNode>;

/// One node of a criteria tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CriteriaNode {
    /// Exact match: column equals the value (`IS NULL` for [`Value::Null`]).
    Value(Value),
    /// Negated match: column differs from the value.
    Not(Value),
    /// Case-insensitive substring match on a text column.
    Contains(String),
    /// Descend into a related record's columns.
    Nested(CriteriaTree),
}

/// How leaves are rewritten when a fragment is merged into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeafWrap {
    /// Keep leaves as written.
    Exact,
    /// Rewrite value leaves to negated matches.
    Not,
    /// Rewrite leaves to substring matches on the value's text form.
    Contains,
}

impl LeafWrap {
    fn apply(self, node: &CriteriaNode) -> CriteriaNode {
        match (self, node) {
            (LeafWrap::Exact, leaf) => leaf.clone(),
            (LeafWrap::Not, CriteriaNode::Value(v)) => CriteriaNode::Not(v.clone()),
            (LeafWrap::Contains, CriteriaNode::Value(v)) => {
                CriteriaNode::Contains(v.to_string())
            }
            // Already-wrapped leaves pass through unchanged.
            (_, leaf) => leaf.clone(),
        }
    }
}

/// Merge `fragment` into `tree`, wrapping leaves per `wrap`.
///
/// Nested maps merge field-by-field; an existing nested subtree is never
/// replaced wholesale. A leaf colliding with a leaf overwrites it.
pub(crate) fn merge_into(tree: &mut CriteriaTree, fragment: &CriteriaTree, wrap: LeafWrap) {
    for (field, node) in fragment {
        match node {
            CriteriaNode::Nested(sub) => {
                let entry = tree
                    .entry(field.clone())
                    .or_insert_with(|| CriteriaNode::Nested(CriteriaTree::new()));
                if let CriteriaNode::Nested(existing) = entry {
                    merge_into(existing, sub, wrap);
                } else {
                    // A leaf at this field gives way to the nested fragment.
                    let mut fresh = CriteriaTree::new();
                    merge_into(&mut fresh, sub, wrap);
                    *entry = CriteriaNode::Nested(fresh);
                }
            }
            leaf => {
                tree.insert(field.clone(), wrap.apply(leaf));
            }
        }
    }
}

/// Fold a flat filter map into `tree` as exact leaves, skipping falsy values
/// so blank selections never constrain the query. Dotted field names expand
/// into nested paths.
pub(crate) fn fold_filters(tree: &mut CriteriaTree, filters: &FieldMap) {
    for (field, value) in filters.iter() {
        if value.is_truthy() {
            insert_path(tree, field, CriteriaNode::Value(value.clone()));
        }
    }
}

/// Insert `node` at a dotted `path`, creating nested subtrees along the way.
///
/// `"profile.city"` lands the leaf inside a `profile` subtree; intermediate
/// leaves found on the path are replaced by subtrees.
pub fn insert_path(tree: &mut CriteriaTree, path: &str, node: CriteriaNode) {
    match path.split_once('.') {
        None => {
            tree.insert(path.to_string(), node);
        }
        Some((head, rest)) => {
            let entry = tree
                .entry(head.to_string())
                .or_insert_with(|| CriteriaNode::Nested(CriteriaTree::new()));
            if !matches!(entry, CriteriaNode::Nested(_)) {
                *entry = CriteriaNode::Nested(CriteriaTree::new());
            }
            if let CriteriaNode::Nested(sub) = entry {
                insert_path(sub, rest, node);
            }
        }
    }
}
