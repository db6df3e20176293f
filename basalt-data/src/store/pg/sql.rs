//! SQL rendering for the Postgres backend.
//!
//! Statements are assembled with `sqlx::QueryBuilder`; values always travel
//! as binds, identifiers are quoted and stripped of quote characters before
//! being pushed as text. Dotted criteria paths render as qualified
//! identifiers (`"profile"."city"`), so nested criteria require the related
//! rows to be reachable under that qualifier (a view or join set up by the
//! caller).

use sqlx::{Postgres, QueryBuilder};

use crate::criteria::{
    flatten_sort, CriteriaNode, CriteriaTree, EffectiveFilter, EffectiveQuery, Value,
};
use crate::entity::{columns, FieldMap};

/// Quote one identifier segment, discarding quote characters.
fn quote_ident(name: &str) -> String {
    let clean: String = name.chars().filter(|c| *c != '"').collect();
    format!("\"{clean}\"")
}

/// Render a dotted path as a qualified identifier.
fn column(path: &str) -> String {
    path.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::String(s) => {
            qb.push_bind(s.clone());
        }
        Value::Integer(i) => {
            qb.push_bind(*i);
        }
        Value::Float(f) => {
            qb.push_bind(*f);
        }
        Value::Boolean(b) => {
            qb.push_bind(*b);
        }
        Value::Uuid(id) => {
            qb.push_bind(*id);
        }
        Value::DateTime(at) => {
            qb.push_bind(*at);
        }
        // NULL comparisons and assignments render as literals instead.
        Value::Null => {
            qb.push("NULL");
        }
    }
}

fn push_tree(qb: &mut QueryBuilder<'_, Postgres>, tree: &CriteriaTree, prefix: &str) {
    let mut first = true;
    for (field, node) in tree {
        let path = if prefix.is_empty() {
            field.clone()
        } else {
            format!("{prefix}.{field}")
        };
        if let CriteriaNode::Nested(sub) = node {
            if sub.is_empty() {
                continue;
            }
            if !first {
                qb.push(" AND ");
            }
            first = false;
            push_tree(qb, sub, &path);
            continue;
        }
        if !first {
            qb.push(" AND ");
        }
        first = false;
        qb.push(column(&path));
        match node {
            CriteriaNode::Value(Value::Null) => {
                qb.push(" IS NULL");
            }
            CriteriaNode::Value(value) => {
                qb.push(" = ");
                push_value(qb, value);
            }
            CriteriaNode::Not(Value::Null) => {
                qb.push(" IS NOT NULL");
            }
            CriteriaNode::Not(value) => {
                qb.push(" <> ");
                push_value(qb, value);
            }
            CriteriaNode::Contains(term) => {
                qb.push(" ILIKE ");
                qb.push_bind(format!("%{term}%"));
            }
            CriteriaNode::Nested(_) => unreachable!("nested handled above"),
        }
    }
    if first {
        qb.push("TRUE");
    }
}

pub(crate) fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EffectiveFilter) {
    match filter {
        EffectiveFilter::One(tree) => push_tree(qb, tree, ""),
        EffectiveFilter::Any(trees) if trees.is_empty() => {
            qb.push("FALSE");
        }
        EffectiveFilter::Any(trees) => {
            for (i, tree) in trees.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push("(");
                push_tree(qb, tree, "");
                qb.push(")");
            }
        }
        EffectiveFilter::Ids(ids) => {
            qb.push(format!("{} = ANY(", column(columns::ID)));
            qb.push_bind(ids.clone());
            qb.push(")");
        }
    }
}

pub(crate) fn select(table: &str, query: &EffectiveQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {} WHERE ", quote_ident(table)));
    push_filter(&mut qb, &query.filter);
    if let Some(sort) = &query.sort {
        let keys = flatten_sort(sort);
        if !keys.is_empty() {
            qb.push(" ORDER BY ");
            for (i, (path, order)) in keys.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(format!("{} {}", column(path), order.as_sql()));
            }
        }
    }
    if let Some(page) = query.page {
        qb.push(format!(" LIMIT {} OFFSET {}", page.take, page.skip));
    }
    qb
}

pub(crate) fn count(table: &str, filter: &EffectiveFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {} WHERE ",
        quote_ident(table)
    ));
    push_filter(&mut qb, filter);
    qb
}

pub(crate) fn insert(table: &str, row: &FieldMap) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (", quote_ident(table)));
    for (i, (field, _)) in row.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(field));
    }
    qb.push(") VALUES (");
    for (i, (_, value)) in row.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(") RETURNING *");
    qb
}

pub(crate) fn update(
    table: &str,
    filter: &EffectiveFilter,
    patch: &FieldMap,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", quote_ident(table)));
    let mut first = true;
    for (field, value) in patch.iter() {
        if !first {
            qb.push(", ");
        }
        first = false;
        qb.push(format!("{} = ", quote_ident(field)));
        push_value(&mut qb, value);
    }
    if !patch.contains(columns::UPDATED_AT) {
        if !first {
            qb.push(", ");
        }
        qb.push(format!("{} = NOW()", quote_ident(columns::UPDATED_AT)));
    }
    qb.push(" WHERE ");
    push_filter(&mut qb, filter);
    qb
}

pub(crate) fn soft_delete(table: &str, filter: &EffectiveFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "UPDATE {} SET {} = NOW() WHERE ",
        quote_ident(table),
        quote_ident(columns::DELETED_AT)
    ));
    push_filter(&mut qb, filter);
    qb
}

pub(crate) fn hard_delete(table: &str, filter: &EffectiveFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE ", quote_ident(table)));
    push_filter(&mut qb, filter);
    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{Criteria, Page, SortOrder};

    #[test]
    fn quoting_strips_embedded_quotes() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("na\"me"), "\"name\"");
        assert_eq!(column("profile.city"), "\"profile\".\"city\"");
    }

    #[test]
    fn select_renders_conjunction_sort_and_window() {
        let query = Criteria::new()
            .eq("status", "active")
            .sort_by("name", SortOrder::Desc)
            .paginate(Page::new(40, 20))
            .compose();
        let qb = select("users", &query);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM \"users\" WHERE \"status\" = $1 \
             ORDER BY \"name\" DESC LIMIT 20 OFFSET 40"
        );
    }

    #[test]
    fn null_comparisons_render_as_is_null() {
        let query = Criteria::new().eq("deleted_at", Value::Null).compose();
        let qb = select("users", &query);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM \"users\" WHERE \"deleted_at\" IS NULL"
        );
    }

    #[test]
    fn fuzzy_branches_render_as_or_groups() {
        let query = Criteria::new()
            .eq("status", "active")
            .search("email", "a")
            .search("name", "b")
            .compose();
        let qb = select("users", &query);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM \"users\" WHERE \
             (\"email\" ILIKE $1 AND \"status\" = $2) OR \
             (\"name\" ILIKE $3 AND \"status\" = $4)"
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        let query = Criteria::new().compose();
        let qb = select("users", &query);
        assert_eq!(qb.sql(), "SELECT * FROM \"users\" WHERE TRUE");
    }

    #[test]
    fn update_always_refreshes_updated_at() {
        let patch = FieldMap::new().set("name", "bob");
        let qb = update("users", &EffectiveFilter::Ids(vec![uuid::Uuid::nil()]), &patch);
        assert_eq!(
            qb.sql(),
            "UPDATE \"users\" SET \"name\" = $1, \"updated_at\" = NOW() \
             WHERE \"id\" = ANY($2)"
        );
    }

    #[test]
    fn soft_delete_stamps_deleted_at() {
        let qb = soft_delete("users", &EffectiveFilter::Ids(vec![uuid::Uuid::nil()]));
        assert_eq!(
            qb.sql(),
            "UPDATE \"users\" SET \"deleted_at\" = NOW() WHERE \"id\" = ANY($1)"
        );
    }

    #[test]
    fn nested_paths_render_qualified() {
        let query = Criteria::new().eq("profile.city", "berlin").compose();
        let qb = select("users", &query);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM \"users\" WHERE \"profile\".\"city\" = $1"
        );
    }
}
