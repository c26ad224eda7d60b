//! Category service.
//!
//! Validation and invariants for categories live here: parent assignments
//! that would create a cycle are rejected, categories with children cannot
//! be deleted, and a highlight priority can only be set on a highlighted
//! category.

mod error;

pub use error::CategoryServiceError;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::instrument;

use storehouse_core::CategoryId;
use storehouse_core::catalog::{CategoryNode, build_tree, is_valid_slug, slugify, would_create_cycle};

use crate::db::{CategoryRepository, RepositoryError};
use crate::models::{Category, CategoryFilter, CategoryUpdate, NewCategory};

/// Longest accepted category name.
const MAX_NAME_LENGTH: usize = 120;

/// Default number of highlighted categories returned.
pub const DEFAULT_HIGHLIGHT_LIMIT: u32 = 8;

/// Largest number of highlighted categories returned.
pub const MAX_HIGHLIGHT_LIMIT: u32 = 50;

/// Category operations.
#[derive(Clone)]
pub struct CategoryService {
    categories: Arc<dyn CategoryRepository>,
}

impl std::fmt::Debug for CategoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CategoryService").finish_non_exhaustive()
    }
}

impl CategoryService {
    /// Create a new category service.
    #[must_use]
    pub fn new(categories: Arc<dyn CategoryRepository>) -> Self {
        Self { categories }
    }

    /// List categories matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Fetch` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_categories(
        &self,
        filter: CategoryFilter,
    ) -> Result<Vec<Category>, CategoryServiceError> {
        self.categories
            .list(filter)
            .await
            .map_err(CategoryServiceError::Fetch)
    }

    /// Get a category by id.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::NotFound` if no category has `id`.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_category(&self, id: CategoryId) -> Result<Category, CategoryServiceError> {
        self.categories
            .get(id)
            .await
            .map_err(CategoryServiceError::Fetch)?
            .ok_or_else(|| CategoryServiceError::not_found(id))
    }

    /// Get a category by slug.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::NotFound` if no category has `slug`.
    #[instrument(skip(self))]
    pub async fn get_category_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.categories
            .get_by_slug(slug)
            .await
            .map_err(CategoryServiceError::Fetch)?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))
    }

    /// Categories matching `filter`, nested under their parents.
    ///
    /// With `active_only`, a hidden category hides its whole subtree: its
    /// children are not promoted to roots.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Fetch` if the query fails.
    #[instrument(skip(self))]
    pub async fn category_tree(
        &self,
        filter: CategoryFilter,
    ) -> Result<Vec<CategoryNode<Category>>, CategoryServiceError> {
        let categories = self.list_categories(filter).await?;

        let categories = if filter.active_only && filter.parent_id.is_none() {
            drop_orphans(categories)
        } else {
            categories
        };

        let tree = build_tree(categories);
        if !tree.detached.is_empty() {
            tracing::warn!(
                detached = ?tree.detached,
                "Category parent cycle found; affected categories shown as roots"
            );
        }

        Ok(tree.roots)
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Validation` for a bad name, slug or
    /// parent, `CategoryServiceError::DuplicateSlug` if the slug is taken.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        mut input: NewCategory,
    ) -> Result<Category, CategoryServiceError> {
        input.name = validate_name(&input.name)?;
        let slug = input.slug.take().unwrap_or_else(|| slugify(&input.name));
        validate_slug(&slug)?;
        input.slug = Some(slug);

        if let Some(parent_id) = input.parent_id {
            self.categories
                .get(parent_id)
                .await
                .map_err(CategoryServiceError::Fetch)?
                .ok_or_else(|| {
                    CategoryServiceError::Validation(format!(
                        "parent category {parent_id} does not exist"
                    ))
                })?;
        }

        let category = self
            .categories
            .create(input)
            .await
            .map_err(|e| CategoryServiceError::from_write(e, CategoryServiceError::Create))?;

        tracing::info!(id = %category.id, slug = %category.slug, "Category created");
        Ok(category)
    }

    /// Apply a partial update to a category.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Cycle` if the new parent is the
    /// category itself or one of its descendants,
    /// `CategoryServiceError::NotFound` if the category does not exist.
    #[instrument(skip(self, update), fields(id = %id))]
    pub async fn update_category(
        &self,
        id: CategoryId,
        mut update: CategoryUpdate,
    ) -> Result<Category, CategoryServiceError> {
        if let Some(name) = &update.name {
            update.name = Some(validate_name(name)?);
        }
        if let Some(slug) = &update.slug {
            validate_slug(slug)?;
        }
        let new_parent = update.parent_id.flatten();
        if let Some(parent) = new_parent {
            self.check_parent(id, parent).await?;
        }

        // The repository repeats the cycle check under the tree lock.
        let category = self
            .categories
            .update(id, update)
            .await
            .map_err(|e| match (e, new_parent) {
                (RepositoryError::Cycle, Some(parent)) => {
                    CategoryServiceError::Cycle { id, parent }
                }
                (e, _) => CategoryServiceError::from_write(e, CategoryServiceError::Update),
            })?
            .ok_or_else(|| CategoryServiceError::not_found(id))?;

        tracing::info!(id = %id, "Category updated");
        Ok(category)
    }

    async fn check_parent(
        &self,
        id: CategoryId,
        parent: CategoryId,
    ) -> Result<(), CategoryServiceError> {
        let all = self
            .categories
            .list(CategoryFilter::default())
            .await
            .map_err(CategoryServiceError::Fetch)?;

        if would_create_cycle(&all, id, Some(parent)) {
            return Err(CategoryServiceError::Cycle { id, parent });
        }
        if !all.iter().any(|c| c.id == parent) {
            return Err(CategoryServiceError::Validation(format!(
                "parent category {parent} does not exist"
            )));
        }
        Ok(())
    }

    /// Delete a category that has no children.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::HasChildren` if any category still
    /// points at it, `CategoryServiceError::NotFound` if it does not exist.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), CategoryServiceError> {
        let children = self
            .categories
            .count_children(id)
            .await
            .map_err(CategoryServiceError::Fetch)?;
        if children > 0 {
            return Err(CategoryServiceError::HasChildren { id, children });
        }

        let deleted = self
            .categories
            .delete(id)
            .await
            .map_err(CategoryServiceError::Delete)?;
        if !deleted {
            return Err(CategoryServiceError::not_found(id));
        }

        tracing::info!(id = %id, "Category deleted");
        Ok(())
    }

    /// Set or clear the highlight flag on several categories. Clearing it
    /// also clears every affected priority.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Validation` if `ids` is empty.
    #[instrument(skip(self))]
    pub async fn update_highlight_status(
        &self,
        ids: Vec<CategoryId>,
        highlighted: bool,
    ) -> Result<u64, CategoryServiceError> {
        if ids.is_empty() {
            return Err(CategoryServiceError::Validation(
                "at least one category id is required".to_string(),
            ));
        }

        let changed = self
            .categories
            .set_highlighted(ids, highlighted)
            .await
            .map_err(CategoryServiceError::Update)?;

        tracing::info!(changed, highlighted, "Category highlight status updated");
        Ok(changed)
    }

    /// Set the highlight priority of a highlighted category.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Validation` for a negative priority or
    /// a category that is not highlighted.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn update_highlight_priority(
        &self,
        id: CategoryId,
        priority: i32,
    ) -> Result<Category, CategoryServiceError> {
        if priority < 0 {
            return Err(CategoryServiceError::Validation(
                "highlight priority must not be negative".to_string(),
            ));
        }

        if let Some(category) = self
            .categories
            .set_highlight_priority(id, priority)
            .await
            .map_err(CategoryServiceError::Update)?
        {
            return Ok(category);
        }

        // Nothing was updated: either missing or not highlighted.
        let exists = self
            .categories
            .get(id)
            .await
            .map_err(CategoryServiceError::Fetch)?
            .is_some();
        if exists {
            Err(CategoryServiceError::Validation(format!(
                "category {id} is not highlighted"
            )))
        } else {
            Err(CategoryServiceError::not_found(id))
        }
    }

    /// Active, visible, highlighted categories by ascending priority.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Validation` if `limit` is out of range.
    #[instrument(skip(self))]
    pub async fn highlighted_categories(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<Category>, CategoryServiceError> {
        let limit = limit.unwrap_or(DEFAULT_HIGHLIGHT_LIMIT);
        if !(1..=MAX_HIGHLIGHT_LIMIT).contains(&limit) {
            return Err(CategoryServiceError::Validation(format!(
                "limit must be between 1 and {MAX_HIGHLIGHT_LIMIT}"
            )));
        }

        self.categories
            .highlighted(i64::from(limit))
            .await
            .map_err(CategoryServiceError::Fetch)
    }

    /// Apply a manual ordering in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::Validation` if an id appears twice.
    #[instrument(skip(self, order), fields(count = order.len()))]
    pub async fn reorder_categories(
        &self,
        order: Vec<(CategoryId, i32)>,
    ) -> Result<u64, CategoryServiceError> {
        let mut seen = HashSet::with_capacity(order.len());
        if let Some((duplicate, _)) = order.iter().find(|(id, _)| !seen.insert(*id)) {
            return Err(CategoryServiceError::Validation(format!(
                "category {duplicate} appears more than once"
            )));
        }
        if order.is_empty() {
            return Ok(0);
        }

        let changed = self
            .categories
            .reorder(order)
            .await
            .map_err(CategoryServiceError::Update)?;

        tracing::info!(changed, "Categories reordered");
        Ok(changed)
    }

    /// Show or hide a category.
    ///
    /// # Errors
    ///
    /// Returns `CategoryServiceError::NotFound` if the category does not
    /// exist.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn set_visibility(
        &self,
        id: CategoryId,
        visible: bool,
    ) -> Result<Category, CategoryServiceError> {
        self.categories
            .set_visibility(id, visible)
            .await
            .map_err(CategoryServiceError::Update)?
            .ok_or_else(|| CategoryServiceError::not_found(id))
    }
}

/// Keep only categories whose parent chain is fully present.
fn drop_orphans(categories: Vec<Category>) -> Vec<Category> {
    let parents: std::collections::HashMap<CategoryId, Option<CategoryId>> = categories
        .iter()
        .map(|c| (c.id, c.parent_id))
        .collect();

    let reachable = |start: &Category| {
        let mut seen = HashSet::new();
        let mut current = start.parent_id;
        while let Some(id) = current {
            if !seen.insert(id) {
                // Loop: keep it so the tree builder can report it.
                return true;
            }
            match parents.get(&id) {
                Some(next) => current = *next,
                None => return false,
            }
        }
        true
    };

    let keep: Vec<bool> = categories.iter().map(reachable).collect();
    categories
        .into_iter()
        .zip(keep)
        .filter_map(|(c, keep)| keep.then_some(c))
        .collect()
}

fn validate_name(name: &str) -> Result<String, CategoryServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryServiceError::Validation(
            "category name is required".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(CategoryServiceError::Validation(format!(
            "category name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_slug(slug: &str) -> Result<(), CategoryServiceError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(CategoryServiceError::Validation(format!(
            "invalid slug: {slug}"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::{MockCategoryRepository, RepositoryError};

    fn category(id: i32, parent: Option<i32>) -> Category {
        Category {
            id: CategoryId::new(id),
            name: format!("Category {id}"),
            slug: format!("category-{id}"),
            description: None,
            parent_id: parent.map(CategoryId::new),
            sort_order: 0,
            is_active: true,
            is_visible: true,
            is_highlighted: false,
            highlight_priority: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(mock: MockCategoryRepository) -> CategoryService {
        CategoryService::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_active_only_filter_is_passed_through() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_list()
            .once()
            .withf(|filter| filter.active_only && filter.parent_id.is_none())
            .return_once(|_| Ok(vec![category(1, None)]));

        let categories = service(mock)
            .list_categories(CategoryFilter {
                active_only: true,
                ..CategoryFilter::default()
            })
            .await
            .unwrap();

        assert_eq!(categories.len(), 1);
        let json = serde_json::to_value(&categories[0]).unwrap();
        assert!(json.get("isVisible").is_some());
        assert!(json.get("is_visible").is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_message() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_list()
            .return_once(|_| Err(RepositoryError::Database(sqlx::Error::PoolTimedOut)));

        let err = service(mock)
            .list_categories(CategoryFilter::default())
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Failed to fetch categories"));
    }

    #[tokio::test]
    async fn test_tree_nests_child_under_parent() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_list()
            .return_once(|_| Ok(vec![category(1, None), category(2, Some(1))]));

        let roots = service(mock)
            .category_tree(CategoryFilter::default())
            .await
            .unwrap();

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].category.id, CategoryId::new(1));
        assert_eq!(roots[0].children.len(), 1);
        assert_eq!(roots[0].children[0].category.id, CategoryId::new(2));
    }

    #[tokio::test]
    async fn test_active_tree_hides_subtree_of_hidden_parent() {
        let mut mock = MockCategoryRepository::new();
        // Category 2 is hidden, so the active listing omits it but keeps 3.
        mock.expect_list()
            .return_once(|_| Ok(vec![category(1, None), category(3, Some(2))]));

        let roots = service(mock)
            .category_tree(CategoryFilter {
                active_only: true,
                ..CategoryFilter::default()
            })
            .await
            .unwrap();

        assert_eq!(roots.len(), 1);
        assert!(roots[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_negative_priority_is_rejected_without_a_write() {
        let mock = MockCategoryRepository::new();

        let err = service(mock)
            .update_highlight_priority(CategoryId::new(1), -1)
            .await
            .unwrap_err();

        assert!(matches!(err, CategoryServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_priority_on_unhighlighted_category() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_set_highlight_priority()
            .once()
            .return_once(|_, _| Ok(None));
        mock.expect_get()
            .once()
            .return_once(|_| Ok(Some(category(4, None))));

        let err = service(mock)
            .update_highlight_priority(CategoryId::new(4), 2)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not highlighted"));
    }

    #[tokio::test]
    async fn test_unhighlight_passes_every_id() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_set_highlighted()
            .once()
            .withf(|ids, highlighted| ids.len() == 3 && !highlighted)
            .return_once(|_, _| Ok(3));

        let changed = service(mock)
            .update_highlight_status(
                vec![CategoryId::new(1), CategoryId::new(2), CategoryId::new(3)],
                false,
            )
            .await
            .unwrap();

        assert_eq!(changed, 3);
    }

    #[tokio::test]
    async fn test_moving_under_descendant_is_a_cycle() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_list().return_once(|_| {
            Ok(vec![
                category(1, None),
                category(2, Some(1)),
                category(3, Some(2)),
            ])
        });
        mock.expect_update().never();

        let update = CategoryUpdate {
            parent_id: Some(Some(CategoryId::new(3))),
            ..CategoryUpdate::default()
        };
        let err = service(mock)
            .update_category(CategoryId::new(1), update)
            .await
            .unwrap_err();

        assert!(matches!(err, CategoryServiceError::Cycle { .. }));
    }

    #[tokio::test]
    async fn test_cycle_found_at_write_time_is_a_cycle() {
        // The snapshot shows no loop, but a concurrent move already put 2
        // under 1 by the time the update runs.
        let mut mock = MockCategoryRepository::new();
        mock.expect_list()
            .return_once(|_| Ok(vec![category(1, None), category(2, None)]));
        mock.expect_update()
            .return_once(|_, _| Err(RepositoryError::Cycle));

        let update = CategoryUpdate {
            parent_id: Some(Some(CategoryId::new(2))),
            ..CategoryUpdate::default()
        };
        let err = service(mock)
            .update_category(CategoryId::new(1), update)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CategoryServiceError::Cycle { id, parent }
                if id == CategoryId::new(1) && parent == CategoryId::new(2)
        ));
        assert_eq!(
            crate::error::AppError::from(err).status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_self_parent_is_a_cycle() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_list()
            .return_once(|_| Ok(vec![category(1, None)]));

        let update = CategoryUpdate {
            parent_id: Some(Some(CategoryId::new(1))),
            ..CategoryUpdate::default()
        };
        let err = service(mock)
            .update_category(CategoryId::new(1), update)
            .await
            .unwrap_err();

        assert!(matches!(err, CategoryServiceError::Cycle { .. }));
    }

    #[tokio::test]
    async fn test_delete_refused_with_children() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_count_children().return_once(|_| Ok(2));
        mock.expect_delete().never();

        let err = service(mock)
            .delete_category(CategoryId::new(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CategoryServiceError::HasChildren { children: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_create_maps_duplicate_slug() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_create()
            .return_once(|_| Err(RepositoryError::Conflict("categories_slug_key".to_string())));

        let input = NewCategory {
            name: "  Teas ".to_string(),
            slug: None,
            description: None,
            parent_id: None,
            sort_order: 0,
            is_active: true,
            is_visible: true,
            image_url: None,
        };
        let err = service(mock).create_category(input).await.unwrap_err();

        assert!(matches!(err, CategoryServiceError::DuplicateSlug));
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_and_bad_slug() {
        let svc = service(MockCategoryRepository::new());
        let mut input = NewCategory {
            name: "   ".to_string(),
            slug: None,
            description: None,
            parent_id: None,
            sort_order: 0,
            is_active: true,
            is_visible: true,
            image_url: None,
        };
        assert!(matches!(
            svc.create_category(input.clone()).await,
            Err(CategoryServiceError::Validation(_))
        ));

        input.name = "Teas".to_string();
        input.slug = Some("Not A Slug".to_string());
        assert!(matches!(
            svc.create_category(input).await,
            Err(CategoryServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reorder_rejects_duplicates() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_reorder().never();

        let err = service(mock)
            .reorder_categories(vec![(CategoryId::new(1), 0), (CategoryId::new(1), 1)])
            .await
            .unwrap_err();

        assert!(matches!(err, CategoryServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_highlighted_limit_bounds() {
        let mut mock = MockCategoryRepository::new();
        mock.expect_highlighted()
            .once()
            .withf(|limit| *limit == i64::from(DEFAULT_HIGHLIGHT_LIMIT))
            .return_once(|_| Ok(vec![]));
        let svc = service(mock);

        assert!(svc.highlighted_categories(None).await.unwrap().is_empty());
        assert!(svc.highlighted_categories(Some(0)).await.is_err());
        assert!(
            svc.highlighted_categories(Some(MAX_HIGHLIGHT_LIMIT + 1))
                .await
                .is_err()
        );
    }
}
