//! End-to-end orchestrator behavior over the in-memory backend.

use std::sync::Arc;

use basalt_data::prelude::*;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: Uuid,
    email: String,
    name: String,
    status: String,
    created_by: Option<Uuid>,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Entity for User {
    const TABLE: &'static str = "users";

    fn id(&self) -> Uuid {
        self.id
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

impl FromFields for User {
    fn from_fields(fields: &FieldMap) -> Result<Self, StorageError> {
        let text = |field: &str| {
            fields
                .get(field)
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        };
        Ok(Self {
            id: fields
                .get(columns::ID)
                .and_then(Value::as_uuid)
                .ok_or_else(|| StorageError::message("users row without id"))?,
            email: text("email"),
            name: text("name"),
            status: text("status"),
            created_by: fields.get(columns::CREATED_BY).and_then(Value::as_uuid),
            updated_at: fields.get(columns::UPDATED_AT).and_then(Value::as_datetime),
            updated_by: fields.get(columns::UPDATED_BY).and_then(Value::as_uuid),
            deleted_at: fields.get(columns::DELETED_AT).and_then(Value::as_datetime),
        })
    }
}

fn users_service() -> CrudService<User, MemoryBackend> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("basalt_data=debug")
        .with_test_writer()
        .try_init();
    let store = RecordStore::new(Arc::new(MemoryBackend::new()));
    CrudService::new(store, "user").with_unique_field("email")
}

fn user(name: &str, email: &str, status: &str) -> FieldMap {
    FieldMap::new()
        .set("name", name)
        .set("email", email)
        .set("status", status)
}

async fn seed(service: &CrudService<User, MemoryBackend>) -> Vec<User> {
    let mut saved = Vec::new();
    for (name, email, status) in [
        ("alice", "alice@corp.io", "active"),
        ("bob", "bob@corp.io", "active"),
        ("carol", "carol@home.net", "active"),
        ("dave", "dave@home.net", "disabled"),
    ] {
        saved.push(
            service
                .save(user(name, email, status), &ReadOptions::none(), None)
                .await
                .expect("seed user"),
        );
    }
    saved
}

#[tokio::test]
async fn full_record_lifecycle() {
    let service = users_service();
    let author = Actor::new(Uuid::new_v4());

    let created = service
        .save(user("alice", "alice@corp.io", "new"), &ReadOptions::none(), Some(&author))
        .await
        .unwrap();
    assert_eq!(created.created_by, Some(author.id));

    let id = created.id.to_string();
    let updated = service
        .update(
            &id,
            FieldMap::new().set("status", "active"),
            &ReadOptions::none(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(updated.status, "active");

    let deleted = service.delete(&id, None, false).await.unwrap();
    assert!(deleted.deleted_at.is_some());

    let err = service.get(&id, &ReadOptions::none()).await.unwrap_err();
    assert_eq!(err.code(), "USER_404_ID");
}

#[tokio::test]
async fn anonymous_update_refreshes_updated_at_but_keeps_the_principal() {
    let service = users_service();
    let editor = Actor::new(Uuid::new_v4());

    let created = service
        .save(user("alice", "alice@corp.io", "new"), &ReadOptions::none(), None)
        .await
        .unwrap();
    let id = created.id.to_string();

    let stamped = service
        .update(
            &id,
            FieldMap::new().set("status", "active"),
            &ReadOptions::none(),
            Some(&editor),
        )
        .await
        .unwrap();
    assert_eq!(stamped.updated_by, Some(editor.id));
    let stamped_at = stamped.updated_at.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let updated = service
        .update(
            &id,
            FieldMap::new().set("status", "dormant"),
            &ReadOptions::none(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(updated.updated_by, Some(editor.id));
    assert!(updated.updated_at.unwrap() > stamped_at);
}

#[tokio::test]
async fn fuzzy_search_means_any_field_with_shared_constraints() {
    let service = users_service();
    seed(&service).await;

    // (status=active AND name~"ali") OR (status=active AND email~"home")
    // must find alice and carol but never the disabled dave.
    let criteria = Criteria::new()
        .eq("status", "active")
        .search("name", "ali")
        .search("email", "home");
    let found = service.get_without_page(criteria).await.unwrap();
    let mut names: Vec<&str> = found.iter().map(|u| u.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["alice", "carol"]);
}

#[tokio::test]
async fn blank_filters_do_not_narrow_results() {
    let service = users_service();
    seed(&service).await;

    let criteria = Criteria::new()
        .filter("status", "active")
        .filter("name", "");
    assert_eq!(service.count(criteria).await.unwrap(), 3);
}

#[tokio::test]
async fn pagination_envelope_reports_window_and_total() {
    let service = users_service();
    seed(&service).await;

    let result = service
        .get_many(
            Criteria::new()
                .sort_by("name", SortOrder::Asc)
                .paginate(Page::from_page(Some(2), Some(3))),
        )
        .await
        .unwrap();
    let ManyRecords::Paginated(envelope) = result else {
        panic!("expected envelope");
    };
    assert_eq!(envelope.page, 2);
    assert_eq!(envelope.limit, 3);
    assert_eq!(envelope.row_count, 4);
    assert_eq!(envelope.data.len(), 1);
    assert_eq!(envelope.data[0].name, "dave");
}

#[tokio::test]
async fn default_window_is_first_page_of_ten() {
    let page = Page::from_page(None, None);
    assert_eq!(page.skip, 0);
    assert_eq!(page.take, 10);
    assert_eq!(Page::from_page(Some(3), Some(20)).skip, 40);
}

#[tokio::test]
async fn zero_affected_is_asymmetric_between_one_and_many() {
    let service = users_service();
    let missing = Uuid::new_v4().to_string();

    let err = service
        .update(
            &missing,
            FieldMap::new().set("status", "x"),
            &ReadOptions::none(),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), 404);

    let ok = service
        .update_many(
            Criteria::new().eq("status", "nobody"),
            FieldMap::new().set("status", "x"),
            None,
        )
        .await
        .unwrap();
    assert!(ok.status);

    let ok = service
        .update_by_ids(
            &[missing.as_str()],
            FieldMap::new().set("status", "x"),
            None,
        )
        .await
        .unwrap();
    assert!(ok.status);

    // Deleting by ids keeps the 404 on zero affected.
    let err = service
        .delete_by_ids(&[missing.as_str()], None, false)
        .await
        .unwrap_err();
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn malformed_ids_fail_fast_in_bulk_operations() {
    let service = users_service();
    let good = Uuid::new_v4().to_string();

    let err = service
        .update_by_ids(
            &[good.as_str(), "not-a-uuid"],
            FieldMap::new().set("status", "x"),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "USER_400_ID");

    let err = service
        .get_by_ids(&["whatever"], &ListOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn delete_many_returns_the_deleted_records() {
    let service = users_service();
    seed(&service).await;

    let deleted = service
        .delete_many(Criteria::new().eq("status", "active"), None, false)
        .await
        .unwrap();
    assert_eq!(deleted.len(), 3);
    assert_eq!(service.count(Criteria::new()).await.unwrap(), 1);

    let err = service
        .delete_many(Criteria::new().eq("status", "active"), None, false)
        .await
        .unwrap_err();
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn classification_resolves_constraints_through_the_registry() {
    let registry = Arc::new(ConstraintRegistry::new());
    let service = users_service().with_registry(Arc::clone(&registry));

    let err = service
        .try_with(async {
            Err::<(), _>(
                StorageError::new("23505", "duplicate key value violates unique constraint")
                    .with_constraint("UNIQUE_user_email"),
            )
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), 409);
    assert_eq!(err.code(), "USER_409_EXIST_EMAIL");
    let response = err.to_response();
    assert_eq!(response.message, "User with given email already exists");
}

#[tokio::test]
async fn transaction_commits_all_or_nothing() {
    let service = users_service();

    service
        .transaction(|scoped| async move {
            scoped
                .save(user("a", "a@x.io", "active"), &ReadOptions::none(), None)
                .await?;
            scoped
                .save(user("b", "b@x.io", "active"), &ReadOptions::none(), None)
                .await?;
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(service.count(Criteria::new()).await.unwrap(), 2);

    let result = service
        .transaction(|scoped| async move {
            scoped
                .save(user("c", "c@x.io", "active"), &ReadOptions::none(), None)
                .await?;
            Err::<(), _>(CrudError::Unclassified { description: None })
        })
        .await;
    assert!(result.is_err());
    assert_eq!(service.count(Criteria::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn nested_transactions_share_one_unit_of_work() {
    let service = users_service();

    let result = service
        .transaction(|outer| async move {
            outer
                .save(user("a", "a@x.io", "active"), &ReadOptions::none(), None)
                .await?;
            outer
                .transaction(|inner| async move {
                    inner
                        .save(user("b", "b@x.io", "active"), &ReadOptions::none(), None)
                        .await?;
                    Ok(())
                })
                .await?;
            // The inner block reused the outer transaction, so this failure
            // discards both writes.
            Err::<(), _>(CrudError::Unclassified { description: None })
        })
        .await;
    assert!(result.is_err());
    assert_eq!(service.count(Criteria::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn get_by_ids_honors_sort_and_window() {
    let service = users_service();
    let saved = seed(&service).await;
    let ids: Vec<String> = saved.iter().map(|u| u.id.to_string()).collect();
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

    let options = ListOptions {
        sort: SortSpec::new().then("name", SortOrder::Desc),
        pagination: Some(Page::new(0, 2)),
        ..ListOptions::default()
    };
    let found = service.get_by_ids(&id_refs, &options).await.unwrap();
    let names: Vec<&str> = found.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["dave", "carol"]);
}
