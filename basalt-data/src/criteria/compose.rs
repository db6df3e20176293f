//! Query composition
//!
//! Callers describe a query as four independent fragments plus sort,
//! pagination, and relation expansion; [`compose`] merges them into one
//! effective filter the backends can execute. Merge order is fixed: exact
//! criteria, then truthy list filters, then negated criteria, then fuzzy
//! search. When the fuzzy fragment names more than one top-level field, the
//! filter branches into alternatives that share the non-fuzzy constraints and
//! differ only in the fuzzy field, so matching any one of them suffices.

use serde::{Deserialize, Serialize};

use crate::criteria::tree::{fold_filters, insert_path, merge_into, LeafWrap};
use crate::criteria::{CriteriaNode, CriteriaTree, Page, SortOrder, SortSpec, SortTree, Value};
use crate::entity::FieldMap;

/// Caller-supplied query fragments for one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    /// Exact-match criteria.
    pub exact: CriteriaTree,
    /// Negated criteria; value leaves become "differs from" comparisons.
    pub not: CriteriaTree,
    /// Fuzzy criteria; value leaves become substring matches.
    pub search: CriteriaTree,
    /// Flat list filters; falsy values are skipped at compose time.
    pub filters: FieldMap,
    /// Sort fields in priority order.
    pub sort: SortSpec,
    /// Pagination window, if the caller wants one.
    pub pagination: Option<Page>,
    /// Relation names to expand on returned records.
    pub relations: Vec<String>,
}

impl Criteria {
    /// Empty criteria matching every live record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact-match condition. Dotted paths nest.
    #[must_use]
    pub fn eq(mut self, path: &str, value: impl Into<Value>) -> Self {
        insert_path(&mut self.exact, path, CriteriaNode::Value(value.into()));
        self
    }

    /// Add a negated condition. Dotted paths nest.
    #[must_use]
    pub fn ne(mut self, path: &str, value: impl Into<Value>) -> Self {
        insert_path(&mut self.not, path, CriteriaNode::Value(value.into()));
        self
    }

    /// Add a fuzzy (substring) condition. Dotted paths nest.
    #[must_use]
    pub fn search(mut self, path: &str, term: impl Into<Value>) -> Self {
        insert_path(&mut self.search, path, CriteriaNode::Value(term.into()));
        self
    }

    /// Add a list filter; falsy values are dropped when composing.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field, value);
        self
    }

    /// Append a sort field.
    #[must_use]
    pub fn sort_by(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(path, order);
        self
    }

    /// Set the pagination window.
    #[must_use]
    pub fn paginate(mut self, page: Page) -> Self {
        self.pagination = Some(page);
        self
    }

    /// Request expansion of a relation on returned records.
    #[must_use]
    pub fn expand(mut self, relation: impl Into<String>) -> Self {
        self.relations.push(relation.into());
        self
    }

    /// Compose the fragments into an executable query.
    #[must_use]
    pub fn compose(&self) -> EffectiveQuery {
        compose(self)
    }
}

/// The filter portion of a composed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EffectiveFilter {
    /// Every condition in the tree must hold.
    One(CriteriaTree),
    /// At least one alternative tree must hold in full.
    Any(Vec<CriteriaTree>),
    /// The record id is one of the listed ids.
    Ids(Vec<uuid::Uuid>),
}

impl EffectiveFilter {
    /// A filter matching every record.
    #[must_use]
    pub fn all() -> Self {
        EffectiveFilter::One(CriteriaTree::new())
    }
}

/// A fully composed query, ready for a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveQuery {
    /// Row filter.
    pub filter: EffectiveFilter,
    /// Nested sort tree, if any sort fields were supplied.
    pub sort: Option<SortTree>,
    /// Pagination window, if supplied.
    pub page: Option<Page>,
    /// Relations to expand; passes through the backend untouched.
    pub relations: Vec<String>,
}

impl EffectiveQuery {
    /// Query matching every record, unsorted and unpaged.
    #[must_use]
    pub fn unfiltered() -> Self {
        Self {
            filter: EffectiveFilter::all(),
            sort: None,
            page: None,
            relations: Vec::new(),
        }
    }

    /// Query selecting the given ids, with relation expansion.
    #[must_use]
    pub fn by_ids(ids: Vec<uuid::Uuid>, relations: Vec<String>) -> Self {
        Self {
            filter: EffectiveFilter::Ids(ids),
            sort: None,
            page: None,
            relations,
        }
    }
}

/// Merge criteria fragments into one effective query.
///
/// Identical fragments always compose to an identical query: fragment trees
/// iterate in field order and the merge sequence is fixed.
#[must_use]
pub fn compose(criteria: &Criteria) -> EffectiveQuery {
    let mut base = CriteriaTree::new();
    merge_into(&mut base, &criteria.exact, LeafWrap::Exact);
    fold_filters(&mut base, &criteria.filters);
    merge_into(&mut base, &criteria.not, LeafWrap::Not);

    let filter = if criteria.search.len() > 1 {
        // One alternative per top-level fuzzy field, each carrying the full
        // set of non-fuzzy constraints.
        let mut branches = Vec::with_capacity(criteria.search.len());
        for (field, node) in &criteria.search {
            let mut branch = base.clone();
            let mut single = CriteriaTree::new();
            single.insert(field.clone(), node.clone());
            merge_into(&mut branch, &single, LeafWrap::Contains);
            branches.push(branch);
        }
        EffectiveFilter::Any(branches)
    } else {
        merge_into(&mut base, &criteria.search, LeafWrap::Contains);
        EffectiveFilter::One(base)
    };

    EffectiveQuery {
        filter,
        sort: criteria.sort.expand(),
        page: criteria.pagination,
        relations: criteria.relations.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(entries: &[(&str, CriteriaNode)]) -> CriteriaTree {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn composition_is_deterministic() {
        let criteria = Criteria::new()
            .eq("status", "active")
            .filter("role", "admin")
            .ne("email", "root@example.com")
            .search("name", "ali");
        assert_eq!(compose(&criteria), compose(&criteria.clone()));
    }

    #[test]
    fn merge_order_lets_not_overwrite_exact() {
        let criteria = Criteria::new().eq("role", "admin").ne("role", "admin");
        let query = compose(&criteria);
        assert_eq!(
            query.filter,
            EffectiveFilter::One(tree_of(&[(
                "role",
                CriteriaNode::Not(Value::String("admin".into()))
            )]))
        );
    }

    #[test]
    fn falsy_filters_never_constrain() {
        let criteria = Criteria::new()
            .eq("status", "active")
            .filter("nickname", "")
            .filter("score", 0_i64);
        let query = compose(&criteria);
        assert_eq!(
            query.filter,
            EffectiveFilter::One(tree_of(&[(
                "status",
                CriteriaNode::Value(Value::String("active".into()))
            )]))
        );
    }

    #[test]
    fn single_fuzzy_field_stays_anded() {
        let criteria = Criteria::new().eq("status", "active").search("name", "ali");
        let query = compose(&criteria);
        assert_eq!(
            query.filter,
            EffectiveFilter::One(tree_of(&[
                ("name", CriteriaNode::Contains("ali".into())),
                ("status", CriteriaNode::Value(Value::String("active".into()))),
            ]))
        );
    }

    #[test]
    fn multiple_fuzzy_fields_branch_into_alternatives() {
        // search {name~"a", email~"b"} with exact {status: "active"} must mean
        // (status=active AND name~a) OR (status=active AND email~b).
        let criteria = Criteria::new()
            .eq("status", "active")
            .search("name", "a")
            .search("email", "b");
        let query = compose(&criteria);
        let EffectiveFilter::Any(branches) = query.filter else {
            panic!("expected branching filter");
        };
        assert_eq!(branches.len(), 2);
        for branch in &branches {
            assert_eq!(
                branch.get("status"),
                Some(&CriteriaNode::Value(Value::String("active".into())))
            );
        }
        // BTreeMap iteration yields email before name.
        assert_eq!(
            branches[0].get("email"),
            Some(&CriteriaNode::Contains("b".into()))
        );
        assert!(!branches[0].contains_key("name"));
        assert_eq!(
            branches[1].get("name"),
            Some(&CriteriaNode::Contains("a".into()))
        );
        assert!(!branches[1].contains_key("email"));
    }

    #[test]
    fn nested_fuzzy_object_counts_as_one_entry() {
        // Both leaves live under the single top-level field "profile", so the
        // filter stays a single conjunction.
        let criteria = Criteria::new()
            .search("profile.city", "ber")
            .search("profile.zip", "101");
        let query = compose(&criteria);
        let EffectiveFilter::One(tree) = query.filter else {
            panic!("expected single tree");
        };
        let CriteriaNode::Nested(profile) = &tree["profile"] else {
            panic!("expected nested profile");
        };
        assert_eq!(profile.len(), 2);
    }

    #[test]
    fn fragments_touching_same_nested_object_merge() {
        let criteria = Criteria::new()
            .eq("profile.city", "berlin")
            .ne("profile.zip", "10115");
        let query = compose(&criteria);
        let EffectiveFilter::One(tree) = query.filter else {
            panic!("expected single tree");
        };
        let CriteriaNode::Nested(profile) = &tree["profile"] else {
            panic!("expected nested profile");
        };
        assert_eq!(
            profile.get("city"),
            Some(&CriteriaNode::Value(Value::String("berlin".into())))
        );
        assert_eq!(
            profile.get("zip"),
            Some(&CriteriaNode::Not(Value::String("10115".into())))
        );
    }

    #[test]
    fn sort_page_and_relations_pass_through() {
        let criteria = Criteria::new()
            .sort_by("created_at", SortOrder::Desc)
            .paginate(Page::from_page(Some(2), Some(5)))
            .expand("profile");
        let query = compose(&criteria);
        assert!(query.sort.is_some());
        assert_eq!(query.page, Some(Page::new(5, 5)));
        assert_eq!(query.relations, vec!["profile".to_string()]);
    }
}
