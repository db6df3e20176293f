//! Criteria model and query composer
//!
//! Queries are described as independent fragments (exact, negated, fuzzy,
//! list filters) over a shared tree shape, then composed into one effective
//! filter with fixed merge order and fuzzy-OR branching. See [`compose`].

mod compose;
mod page;
mod sort;
mod tree;
mod value;

pub use compose::{compose, Criteria, EffectiveFilter, EffectiveQuery};
pub use page::{Page, DEFAULT_LIMIT, DEFAULT_PAGE};
pub use sort::{SortNode, SortOrder, SortSpec, SortTree};
pub(crate) use sort::flatten as flatten_sort;
pub use tree::{insert_path, CriteriaNode, CriteriaTree};
pub use value::Value;
