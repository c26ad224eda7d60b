//! Repository-level guarantees for category reparenting.

use std::sync::Arc;

use storehouse_core::CategoryId;
use storehouse_core::catalog::build_tree;
use storehouse_integration_tests::InMemoryCategoryRepository;
use storehouse_storefront::db::{CategoryRepository, RepositoryError};
use storehouse_storefront::models::{CategoryUpdate, NewCategory};
use storehouse_storefront::services::{CategoryService, CategoryServiceError};

fn new_category(name: &str) -> NewCategory {
    NewCategory {
        name: name.to_string(),
        slug: None,
        description: None,
        parent_id: None,
        sort_order: 0,
        is_active: true,
        is_visible: true,
        image_url: None,
    }
}

fn move_under(parent: CategoryId) -> CategoryUpdate {
    CategoryUpdate {
        parent_id: Some(Some(parent)),
        ..CategoryUpdate::default()
    }
}

#[tokio::test]
async fn test_update_refuses_parent_inside_subtree() {
    let repo = InMemoryCategoryRepository::default();
    let a = repo.create(new_category("A")).await.unwrap().id;
    let b = repo.create(new_category("B")).await.unwrap().id;
    let c = repo.create(new_category("C")).await.unwrap().id;

    repo.update(b, move_under(a)).await.unwrap();
    repo.update(c, move_under(b)).await.unwrap();

    let err = repo.update(a, move_under(c)).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Cycle));

    let err = repo.update(a, move_under(a)).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Cycle));

    let a_row = repo.get(a).await.unwrap().unwrap();
    assert_eq!(a_row.parent_id, None, "rejected move leaves the row alone");
}

#[tokio::test]
async fn test_crossed_moves_leave_an_acyclic_tree() {
    let repo = Arc::new(InMemoryCategoryRepository::default());
    let a = repo.create(new_category("A")).await.unwrap().id;
    let b = repo.create(new_category("B")).await.unwrap().id;
    let service = CategoryService::new(repo.clone());

    let (first, second) = tokio::join!(
        service.update_category(a, move_under(b)),
        service.update_category(b, move_under(a)),
    );

    let failures = [&first, &second]
        .into_iter()
        .filter(|r| matches!(r, Err(CategoryServiceError::Cycle { .. })))
        .count();
    assert_eq!(failures, 1, "exactly one of the crossed moves is refused");
    assert_eq!(usize::from(first.is_ok()) + usize::from(second.is_ok()), 1);

    let tree = build_tree(repo.all());
    assert!(tree.detached.is_empty());
    assert_eq!(tree.node_count(), 2);
}
