//! Repository protocol tests over the in-memory backends.

mod support;

use common::{AppError, NotFoundExt};
use domain::{Coupon, Entity, User};
use persistence_lib::{CacheKeys, CacheStore, Filter};

use support::{user, Harness};

#[tokio::test]
async fn test_insert_then_get_round_trips() {
    let harness = Harness::new();
    let users = harness.users();

    let created = users.insert(user("Alpha")).await.unwrap();

    assert!(!created.id().is_nil());
    assert_eq!(created.meta.created_at, created.meta.updated_at);
    assert!(created.meta.deleted_at.is_none());

    let fetched = users.get_by_id(created.id()).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.name, "Alpha");

    assert_eq!(harness.event_names(1).await, vec!["user.created"]);
}

#[tokio::test]
async fn test_insert_populates_cache_and_read_survives_cache_loss() {
    let harness = Harness::new();
    let users = harness.users();

    let created = users.insert(user("Alpha")).await.unwrap();
    let key = CacheKeys::entity(User::COLLECTION, &created.id());
    assert!(harness.cache.contains_key(&key));

    harness.cache.delete(&key).await.unwrap();
    assert_eq!(users.get_by_id(created.id()).await.unwrap(), created);
    assert!(harness.cache.contains_key(&key));
}

#[tokio::test]
async fn test_replace_invalidates_cached_pre_image() {
    let harness = Harness::new();
    let users = harness.users();

    let created = users.insert(user("Alpha")).await.unwrap();
    users.get_by_id(created.id()).await.unwrap();

    let mut changed = created.clone();
    changed.name = "Beta".to_string();
    let replaced = users.replace(changed).await.unwrap();

    assert_eq!(replaced.name, "Beta");
    assert_eq!(replaced.meta.created_at, created.meta.created_at);
    assert!(replaced.meta.updated_at > created.meta.updated_at);

    // Deleted rather than overwritten
    let key = CacheKeys::entity(User::COLLECTION, &created.id());
    assert!(!harness.cache.contains_key(&key));

    let fetched = users.get_by_id(created.id()).await.unwrap();
    assert_eq!(fetched.name, "Beta");
    assert!(fetched.meta.updated_at > fetched.meta.created_at);

    let mut names = harness.event_names(2).await;
    names.sort();
    assert_eq!(names, vec!["user.created", "user.updated"]);
}

#[tokio::test]
async fn test_reader_sees_post_image_once_replace_returns() {
    let harness = Harness::new();
    let users = harness.users();
    let created = users.insert(user("Alpha")).await.unwrap();

    // A concurrent reader already holds the cached pre-image
    let before = users.scoped().get_by_id(created.id()).await.unwrap();
    assert_eq!(before.name, "Alpha");

    let writer = users.clone();
    let mut next = created.clone();
    next.name = "Alpha Prime".to_string();
    tokio::spawn(async move { writer.replace(next).await })
        .await
        .unwrap()
        .unwrap();

    let after = users.scoped().get_by_id(created.id()).await.unwrap();
    assert_eq!(after.name, "Alpha Prime");
}

#[tokio::test]
async fn test_last_write_wins_regardless_of_cache_state() {
    let harness = Harness::new();
    let users = harness.users();
    let mut current = users.insert(user("Alpha")).await.unwrap();

    for round in 0..5 {
        users.get_by_id(current.id()).await.unwrap();
        current.name = format!("Alpha {}", round);
        current = users.replace(current).await.unwrap();
    }

    let fetched = users.get_by_id(current.id()).await.unwrap();
    assert_eq!(fetched.name, "Alpha 4");
    assert_eq!(fetched, current);
}

#[tokio::test]
async fn test_soft_delete_hides_row_and_is_idempotent() {
    let harness = Harness::new();
    let users = harness.users();
    let created = users.insert(user("Alpha")).await.unwrap();
    users.get_by_id(created.id()).await.unwrap();

    assert!(users.soft_delete(created.id()).await.unwrap());
    assert!(matches!(users.get_by_id(created.id()).await, Err(AppError::NotFound)));
    assert!(users.get_by_id(created.id()).await.optional().unwrap().is_none());

    assert!(!users.soft_delete(created.id()).await.unwrap());

    let tombstone = users.get_by_id_with_deleted(created.id()).await.unwrap();
    assert!(tombstone.meta.deleted_at.is_some());
    assert_eq!(tombstone.name, "Alpha");

    let events = harness.webhooks.wait_for(2, support::DELIVERY_WAIT).await;
    let deletions: Vec<_> = events.iter().filter(|e| e.name == "user.deleted").collect();
    assert_eq!(deletions.len(), 1);
    assert_eq!(deletions[0].payload["_id"], created.id().to_string());
    assert_eq!(deletions[0].payload["modifiedCount"], 1);
}

#[tokio::test]
async fn test_soft_delete_of_unknown_id_returns_false() {
    let harness = Harness::new();
    let users = harness.users();

    let missing = domain::DocumentId::new();
    assert!(!users.soft_delete(missing).await.unwrap());
    assert!(matches!(
        users.get_by_id_with_deleted(missing).await,
        Err(AppError::NotFound)
    ));
}

#[tokio::test]
async fn test_tombstone_cannot_be_replaced() {
    let harness = Harness::new();
    let users = harness.users();
    let created = users.insert(user("Alpha")).await.unwrap();
    users.soft_delete(created.id()).await.unwrap();

    let mut revived = created.clone();
    revived.name = "Zombie".to_string();

    assert!(matches!(users.replace(revived).await, Err(AppError::NotFound)));
    let stored = users.get_by_id_with_deleted(created.id()).await.unwrap();
    assert_eq!(stored.name, "Alpha");
    assert!(stored.is_deleted());
}

#[tokio::test]
async fn test_find_one_by_predicate_populates_both_keys() {
    let harness = Harness::new();
    let coupons = harness.repository::<Coupon>();

    coupons.insert(Coupon::new("spring10", 10).unwrap()).await.unwrap();
    let summer = coupons.insert(Coupon::new("summer25", 25).unwrap()).await.unwrap();

    let filter = Filter::new().eq("code", "SUMMER25");
    let found = coupons.find_one(filter.clone()).await.unwrap();
    assert_eq!(found, summer);

    assert!(harness
        .cache
        .contains_key(&CacheKeys::query(Coupon::COLLECTION, &filter.clone().live())));
    assert!(harness
        .cache
        .contains_key(&CacheKeys::entity(Coupon::COLLECTION, &summer.id())));

    let missing = coupons.find_one(Filter::new().eq("code", "WINTER")).await;
    assert!(matches!(missing, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_predicate_entries_expire_or_are_cleared_explicitly() {
    let harness = Harness::new();
    let coupons = harness.repository::<Coupon>();
    let coupon = coupons.insert(Coupon::new("flash", 50).unwrap()).await.unwrap();

    let by_code = Filter::new().eq("code", "FLASH");
    coupons.find_one(by_code.clone()).await.unwrap();

    let mut cheaper = coupon.clone();
    cheaper.discount_percent = 5;
    coupons.replace(cheaper).await.unwrap();

    // Predicate entries tolerate staleness until TTL...
    assert_eq!(coupons.find_one(by_code.clone()).await.unwrap().discount_percent, 50);

    // ...unless the writer clears them
    coupons.invalidate_lookup(by_code.clone()).await;
    assert_eq!(coupons.find_one(by_code).await.unwrap().discount_percent, 5);
}

#[tokio::test]
async fn test_soft_delete_where_tombstones_every_match() {
    let harness = Harness::new();
    let coupons = harness.repository::<Coupon>();

    let mut created = Vec::new();
    for (code, merchant) in [("A1", "m1"), ("A2", "m1"), ("B1", "m2")] {
        let mut coupon = Coupon::new(code, 10).unwrap();
        coupon.merchant_id = Some(merchant.to_string());
        created.push(coupons.insert(coupon).await.unwrap());
    }
    for coupon in &created {
        coupons.get_by_id(coupon.id()).await.unwrap();
    }

    let removed = coupons
        .soft_delete_where(Filter::new().eq("merchantId", "m1"))
        .await
        .unwrap();
    assert_eq!(removed, 2);

    for coupon in &created[..2] {
        assert!(matches!(coupons.get_by_id(coupon.id()).await, Err(AppError::NotFound)));
        assert!(!harness
            .cache
            .contains_key(&CacheKeys::entity(Coupon::COLLECTION, &coupon.id())));
    }
    assert!(coupons.get_by_id(created[2].id()).await.is_ok());

    // A second pass finds nothing left to delete
    let again = coupons
        .soft_delete_where(Filter::new().eq("merchantId", "m1"))
        .await
        .unwrap();
    assert_eq!(again, 0);

    let names = harness.event_names(5).await;
    assert_eq!(names.iter().filter(|n| *n == "coupon.deleted").count(), 2);
    assert_eq!(coupons.count(Filter::new()).await.unwrap(), 1);
    assert_eq!(harness.store.len(Coupon::COLLECTION).await, 3);
}
