mod support;

use common::AppError;
use domain::{CreateUser, Entity, UpdateUser, UserRole};
use persistence_lib::{PageArgs, UserRepository, UserStore};

use support::Harness;
use tokio_test::{assert_err, assert_ok};

fn store(harness: &Harness) -> UserStore {
    UserStore::new(harness.users())
}

fn signup(email: &str, name: &str) -> CreateUser {
    CreateUser {
        email: email.to_string(),
        name: name.to_string(),
        phone: None,
    }
}

#[tokio::test]
async fn test_create_normalizes_email_and_announces() {
    let harness = Harness::new();
    let users = store(&harness);

    let created = users
        .create(signup("Alpha@Example.com", "Alpha"))
        .await
        .unwrap();

    assert_eq!(created.email, "alpha@example.com");
    assert_eq!(created.role, UserRole::User);
    assert_eq!(harness.event_names(1).await, vec!["user.created"]);
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let harness = Harness::new();
    let users = store(&harness);

    let err = assert_err!(users.create(signup("nope", "")).await);
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(harness.store.len("users").await, 0);
}

#[tokio::test]
async fn test_create_rejects_registered_email() {
    let harness = Harness::new();
    let users = store(&harness);

    users.create(signup("alpha@example.com", "Alpha")).await.unwrap();
    let err = assert_err!(users.create(signup("ALPHA@example.com", "Impostor")).await);

    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(harness.store.len("users").await, 1);
}

#[tokio::test]
async fn test_find_by_email_ignores_case_and_whitespace() {
    let harness = Harness::new();
    let users = store(&harness);
    let created = users.create(signup("beta@example.com", "Beta")).await.unwrap();

    let found = users.find_by_email("  BETA@example.com ").await.unwrap();
    assert_eq!(found, Some(created));
    assert!(users.find_by_email("gamma@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_refreshes_email_lookup() {
    let harness = Harness::new();
    let users = store(&harness);
    let created = users.create(signup("gamma@example.com", "Gamma")).await.unwrap();

    // Warm the email lookup
    users.find_by_email("gamma@example.com").await.unwrap();

    let updated = users
        .update(
            created.id(),
            UpdateUser {
                name: Some("Gamma Ray".to_string()),
                role: Some(UserRole::Provider),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Gamma Ray");
    assert!(updated.meta.updated_at > created.meta.updated_at);

    let by_email = users.find_by_email("gamma@example.com").await.unwrap().unwrap();
    assert_eq!(by_email.name, "Gamma Ray");
    assert_eq!(by_email.role, UserRole::Provider);
}

#[tokio::test]
async fn test_update_of_missing_user_is_not_found() {
    let harness = Harness::new();
    let users = store(&harness);

    let err = users
        .update(domain::DocumentId::new(), UpdateUser::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn test_delete_hides_user_from_every_lookup() {
    let harness = Harness::new();
    let users = store(&harness);
    let created = users.create(signup("delta@example.com", "Delta")).await.unwrap();
    users.find_by_email("delta@example.com").await.unwrap();

    assert!(users.delete(created.id()).await.unwrap());
    assert!(!users.delete(created.id()).await.unwrap());

    assert!(users.find_by_id(created.id()).await.unwrap().is_none());
    assert!(users.find_by_email("delta@example.com").await.unwrap().is_none());

    let tombstone = users
        .find_by_id_with_deleted(created.id())
        .await
        .unwrap()
        .unwrap();
    assert!(!tombstone.is_active());

    // The address is free again once its owner is gone
    assert_ok!(users.create(signup("delta@example.com", "Delta II")).await);
}

#[tokio::test]
async fn test_list_by_role() {
    let harness = Harness::new();
    let users = store(&harness);

    let provider = users.create(signup("p@example.com", "Provider")).await.unwrap();
    users.create(signup("u@example.com", "Plain")).await.unwrap();
    users
        .update(
            provider.id(),
            UpdateUser {
                role: Some(UserRole::Provider),
                ..UpdateUser::default()
            },
        )
        .await
        .unwrap();

    let providers = users
        .list(Some(UserRole::Provider), PageArgs::forward(10, None))
        .await
        .unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers.items[0].id(), provider.id());

    let everyone = users.list(None, PageArgs::default()).await.unwrap();
    assert_eq!(everyone.total_count, 2);
}
