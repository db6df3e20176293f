//! Sort specifications with dotted-path expansion.

use serde::{Deserialize, Serialize};

/// Sort direction for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl SortOrder {
    /// SQL keyword for this direction.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Ordered list of `(path, direction)` pairs as supplied by the caller.
///
/// Paths may be dotted (`"profile.city"`) to sort on a related record's
/// column; [`SortSpec::expand`] turns them into a nested tree matching the
/// criteria-tree shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SortSpec(Vec<(String, SortOrder)>);

impl SortSpec {
    /// Empty specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append.
    #[must_use]
    pub fn then(mut self, path: impl Into<String>, order: SortOrder) -> Self {
        self.0.push((path.into(), order));
        self
    }

    /// Append a `(path, direction)` pair.
    pub fn push(&mut self, path: impl Into<String>, order: SortOrder) {
        self.0.push((path.into(), order));
    }

    /// Whether no sort fields were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the pairs in the order they were supplied.
    pub fn iter(&self) -> impl Iterator<Item = (&str, SortOrder)> {
        self.0.iter().map(|(path, order)| (path.as_str(), *order))
    }

    /// Expand dotted paths into a nested sort tree, merging shared prefixes.
    /// Returns `None` when no fields were supplied.
    #[must_use]
    pub fn expand(&self) -> Option<SortTree> {
        if self.0.is_empty() {
            return None;
        }
        let mut tree = SortTree::new();
        for (path, order) in &self.0 {
            insert_sort_path(&mut tree, path, *order);
        }
        Some(tree)
    }
}

/// Nested sort tree; insertion order of fields is preserved.
pub type SortTree = Vec<(String, SortNode)>;

/// One node of a sort tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortNode {
    /// Sort this column in the given direction.
    Order(SortOrder),
    /// Descend into a related record's columns.
    Nested(SortTree),
}

/// Flatten a nested sort tree back into dotted `(path, direction)` pairs,
/// preserving priority order.
pub(crate) fn flatten(tree: &SortTree) -> Vec<(String, SortOrder)> {
    fn walk(tree: &SortTree, prefix: &str, out: &mut Vec<(String, SortOrder)>) {
        for (field, node) in tree {
            let path = if prefix.is_empty() {
                field.clone()
            } else {
                format!("{prefix}.{field}")
            };
            match node {
                SortNode::Order(order) => out.push((path, *order)),
                SortNode::Nested(sub) => walk(sub, &path, out),
            }
        }
    }
    let mut out = Vec::new();
    walk(tree, "", &mut out);
    out
}

fn insert_sort_path(tree: &mut SortTree, path: &str, order: SortOrder) {
    match path.split_once('.') {
        None => match tree.iter_mut().find(|(field, _)| field == path) {
            Some((_, node)) => *node = SortNode::Order(order),
            None => tree.push((path.to_string(), SortNode::Order(order))),
        },
        Some((head, rest)) => {
            let idx = match tree.iter().position(|(field, _)| field == head) {
                Some(idx) => idx,
                None => {
                    tree.push((head.to_string(), SortNode::Nested(SortTree::new())));
                    tree.len() - 1
                }
            };
            let node = &mut tree[idx].1;
            if !matches!(node, SortNode::Nested(_)) {
                *node = SortNode::Nested(SortTree::new());
            }
            if let SortNode::Nested(sub) = node {
                insert_sort_path(sub, rest, order);
            }
        }
    }
}
