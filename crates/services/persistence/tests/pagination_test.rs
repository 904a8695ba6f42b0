//! Cursor pagination over live documents.

mod support;

use common::AppError;
use domain::{DocumentId, Entity, User};
use persistence_lib::{Cursor, Filter, Page, PageArgs, Repository};

use support::{user, Harness};

/// Insert `n` users and return their ids in `_id` order.
async fn seed(users: &Repository<User>, n: usize) -> Vec<DocumentId> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        ids.push(users.insert(user(&format!("User{}", i))).await.unwrap().id());
    }
    ids.sort_by_key(|id| id.to_string());
    ids
}

fn ids(page: &Page<User>) -> Vec<DocumentId> {
    page.items.iter().map(|u| u.id()).collect()
}

#[tokio::test]
async fn test_soft_deleted_rows_drop_out_of_lists() {
    let harness = Harness::new();
    let users = harness.users();
    let rows = seed(&users, 3).await;

    assert!(users.soft_delete(rows[1]).await.unwrap());

    let page = users.list(Filter::new(), &PageArgs::forward(10, None)).await.unwrap();
    assert_eq!(ids(&page), vec![rows[0], rows[2]]);
    assert_eq!(page.total_count, 2);
    assert!(!page.has_next);
    assert!(!page.has_previous);
}

#[tokio::test]
async fn test_forward_pages() {
    let harness = Harness::new();
    let users = harness.users();
    let r = seed(&users, 5).await;

    let first = users.list(Filter::new(), &PageArgs::forward(2, None)).await.unwrap();
    assert_eq!(ids(&first), vec![r[0], r[1]]);
    assert!(first.has_next);
    assert!(!first.has_previous);
    assert_eq!(first.total_count, 5);

    let second = users
        .list(Filter::new(), &PageArgs::forward(2, Some(Cursor::from_id(&r[1]))))
        .await
        .unwrap();
    assert_eq!(ids(&second), vec![r[2], r[3]]);
    assert!(second.has_previous);
    assert!(second.has_next);
    assert_eq!(second.total_count, 3);

    let last = users
        .list(Filter::new(), &PageArgs::forward(2, Some(Cursor::from_id(&r[3]))))
        .await
        .unwrap();
    assert_eq!(ids(&last), vec![r[4]]);
    assert!(!last.has_next);
    assert!(last.has_previous);
}

#[tokio::test]
async fn test_backward_page_is_returned_in_ascending_order() {
    let harness = Harness::new();
    let users = harness.users();
    let r = seed(&users, 5).await;

    let page = users
        .list(Filter::new(), &PageArgs::backward(2, Some(Cursor::from_id(&r[4]))))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![r[2], r[3]]);
    assert!(page.has_previous);
    assert!(page.has_next);
    assert_eq!(page.start_cursor, Some(Cursor::from_id(&r[2])));
    assert_eq!(page.end_cursor, Some(Cursor::from_id(&r[3])));

    let tail = users.list(Filter::new(), &PageArgs::backward(2, None)).await.unwrap();
    assert_eq!(ids(&tail), vec![r[3], r[4]]);
    assert!(!tail.has_next);
}

#[tokio::test]
async fn test_forward_pages_concatenate_to_full_scan() {
    let harness = Harness::new();
    let users = harness.users();
    let all = seed(&users, 7).await;

    for k in 1..=4 {
        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = users
                .list(Filter::new(), &PageArgs::forward(k, after.clone()))
                .await
                .unwrap();
            seen.extend(ids(&page));
            if !page.has_next {
                break;
            }
            after = page.end_cursor.clone();
        }
        assert_eq!(seen, all, "page size {}", k);
    }
}

#[tokio::test]
async fn test_backward_page_reproduces_previous_forward_page() {
    let harness = Harness::new();
    let users = harness.users();
    seed(&users, 6).await;

    let mut after = None;
    let mut previous: Option<Page<User>> = None;
    loop {
        let page = users
            .list(Filter::new(), &PageArgs::forward(2, after.clone()))
            .await
            .unwrap();

        if let Some(prev) = &previous {
            let back = users
                .list(Filter::new(), &PageArgs::backward(2, page.start_cursor.clone()))
                .await
                .unwrap();
            assert_eq!(ids(&back), ids(prev));
        }

        if !page.has_next {
            break;
        }
        after = page.end_cursor.clone();
        previous = Some(page);
    }
}

#[tokio::test]
async fn test_lists_never_return_tombstones() {
    let harness = Harness::new();
    let users = harness.users();
    let rows = seed(&users, 8).await;
    for id in rows.iter().step_by(3) {
        users.soft_delete(*id).await.unwrap();
    }

    let args = [
        PageArgs::default(),
        PageArgs::forward(2, None),
        PageArgs::forward(3, Some(Cursor::from_id(&rows[1]))),
        PageArgs::backward(4, None),
        PageArgs::backward(2, Some(Cursor::from_id(&rows[7]))),
    ];
    for arg in &args {
        let page = users.list(Filter::new(), arg).await.unwrap();
        assert!(page.items.iter().all(|u| u.meta.deleted_at.is_none()));
    }

    let everything = users.list(Filter::new(), &PageArgs::default()).await.unwrap();
    assert_eq!(everything.total_count, 5);
    assert_eq!(everything.len(), 5);
}

#[tokio::test]
async fn test_zero_sized_page_reports_remaining_rows() {
    let harness = Harness::new();
    let users = harness.users();

    let empty = users.list(Filter::new(), &PageArgs::forward(0, None)).await.unwrap();
    assert!(empty.is_empty());
    assert!(!empty.has_next);

    seed(&users, 1).await;
    let page = users.list(Filter::new(), &PageArgs::forward(0, None)).await.unwrap();
    assert!(page.is_empty());
    assert!(page.has_next);
    assert_eq!(page.total_count, 1);
    assert!(page.start_cursor.is_none());
}

#[tokio::test]
async fn test_malformed_paging_input_is_rejected() {
    let harness = Harness::new();
    let users = harness.users();

    let garbled = PageArgs::forward(2, Some(Cursor::from("%%%")));
    assert!(matches!(
        users.list(Filter::new(), &garbled).await,
        Err(AppError::InvalidCursor(_))
    ));

    let negative = PageArgs::backward(-1, None);
    let err = users.list(Filter::new(), &negative).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_cursor_for_unknown_id_still_bounds_the_scan() {
    let harness = Harness::new();
    let users = harness.users();
    let rows = seed(&users, 3).await;

    // Minted after every row, so nothing sorts past it
    let beyond = Cursor::from_id(&DocumentId::new());
    let page = users
        .list(Filter::new(), &PageArgs::forward(10, Some(beyond.clone())))
        .await
        .unwrap();
    assert!(page.is_empty());
    assert!(page.has_previous);

    let back = users
        .list(Filter::new(), &PageArgs::backward(10, Some(beyond)))
        .await
        .unwrap();
    assert_eq!(ids(&back), rows);
}

#[tokio::test]
async fn test_list_combines_caller_filter_with_window() {
    let harness = Harness::new();
    let users = harness.users();
    seed(&users, 2).await;
    let mut admin = user("Root");
    admin.role = domain::UserRole::Admin;
    let admin = users.insert(admin).await.unwrap();

    let page = users
        .list(Filter::new().eq("role", "admin"), &PageArgs::forward(5, None))
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![admin.id()]);
    assert_eq!(page.total_count, 1);
}
