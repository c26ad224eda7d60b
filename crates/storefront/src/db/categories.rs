//! Category repository.

use async_trait::async_trait;
use mockall::automock;
use sqlx::{PgPool, Postgres, QueryBuilder};

use storehouse_core::CategoryId;
use storehouse_core::catalog::slugify;

use super::RepositoryError;
use crate::models::{Category, CategoryFilter, CategoryRow, CategoryUpdate, NewCategory};

const CATEGORY_COLUMNS: &str = "id, name, slug, description, parent_id, sort_order, \
     is_active, is_visible, is_highlighted, highlight_priority, image_url, \
     created_at, updated_at";

/// Data access for `categories`.
#[automock]
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Categories matching `filter`, ordered by `(sort_order, name, id)`.
    async fn list(&self, filter: CategoryFilter) -> Result<Vec<Category>, RepositoryError>;

    async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError>;

    async fn create(&self, input: NewCategory) -> Result<Category, RepositoryError>;

    /// Returns `None` when no row has `id`.
    async fn update(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError>;

    /// Returns whether a row was deleted.
    async fn delete(&self, id: CategoryId) -> Result<bool, RepositoryError>;

    async fn count_children(&self, id: CategoryId) -> Result<i64, RepositoryError>;

    /// Set the highlight flag on every id. Clearing the flag also clears the
    /// priority. Returns the number of rows changed.
    async fn set_highlighted(
        &self,
        ids: Vec<CategoryId>,
        highlighted: bool,
    ) -> Result<u64, RepositoryError>;

    async fn set_highlight_priority(
        &self,
        id: CategoryId,
        priority: i32,
    ) -> Result<Option<Category>, RepositoryError>;

    /// Highlighted categories, priority ascending with unprioritised last.
    async fn highlighted(&self, limit: i64) -> Result<Vec<Category>, RepositoryError>;

    /// Apply every `(id, sort_order)` pair atomically.
    async fn reorder(&self, order: Vec<(CategoryId, i32)>) -> Result<u64, RepositoryError>;

    async fn set_visibility(
        &self,
        id: CategoryId,
        visible: bool,
    ) -> Result<Option<Category>, RepositoryError>;
}

/// `PostgreSQL` implementation of [`CategoryRepository`].
#[derive(Debug, Clone)]
pub struct PgCategoryRepository {
    pool: PgPool,
}

impl PgCategoryRepository {
    /// Create a new category repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Build the listing query for `filter`.
fn list_query(filter: CategoryFilter) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE 1=1"
    ));

    if filter.active_only {
        query.push(" AND is_active = TRUE AND is_visible = TRUE");
    }
    if let Some(parent_id) = filter.parent_id {
        query.push(" AND parent_id = ");
        query.push_bind(parent_id);
    }
    if filter.highlighted_only {
        query.push(" AND is_highlighted = TRUE");
    }

    query.push(" ORDER BY sort_order, name, id");
    query
}

/// Advisory lock key held while a category changes parent.
const CATEGORY_TREE_LOCK: i64 = 0x5348_4341_5452;

/// Whether `$2` is `$1` or one of `$1`'s ancestors. `UNION` stops the walk
/// even if the stored tree already contains a loop.
const PARENT_CREATES_CYCLE_SQL: &str = r"
    WITH RECURSIVE ancestors(id, parent_id) AS (
        SELECT id, parent_id FROM categories WHERE id = $1
        UNION
        SELECT c.id, c.parent_id
        FROM categories c
        JOIN ancestors a ON c.id = a.parent_id
    )
    SELECT EXISTS (SELECT 1 FROM ancestors WHERE id = $2)
";

fn update_query(id: CategoryId, update: CategoryUpdate) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE categories SET updated_at = now()");

    if let Some(name) = update.name {
        query.push(", name = ").push_bind(name);
    }
    if let Some(slug) = update.slug {
        query.push(", slug = ").push_bind(slug);
    }
    if let Some(description) = update.description {
        query.push(", description = ").push_bind(description);
    }
    if let Some(parent_id) = update.parent_id {
        query.push(", parent_id = ").push_bind(parent_id);
    }
    if let Some(sort_order) = update.sort_order {
        query.push(", sort_order = ").push_bind(sort_order);
    }
    if let Some(is_active) = update.is_active {
        query.push(", is_active = ").push_bind(is_active);
    }
    if let Some(is_visible) = update.is_visible {
        query.push(", is_visible = ").push_bind(is_visible);
    }
    if let Some(image_url) = update.image_url {
        query.push(", image_url = ").push_bind(image_url);
    }

    query.push(" WHERE id = ").push_bind(id);
    query.push(format!(" RETURNING {CATEGORY_COLUMNS}"));
    query
}

fn ids_to_i32(ids: &[CategoryId]) -> Vec<i32> {
    ids.iter().map(CategoryId::as_i32).collect()
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn list(&self, filter: CategoryFilter) -> Result<Vec<Category>, RepositoryError> {
        let rows = list_query(filter)
            .build_query_as::<CategoryRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Category::from))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Category::from))
    }

    async fn create(&self, input: NewCategory) -> Result<Category, RepositoryError> {
        let slug = input.slug.unwrap_or_else(|| slugify(&input.name));

        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            r"
            INSERT INTO categories
                (name, slug, description, parent_id, sort_order, is_active, is_visible, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&slug)
        .bind(&input.description)
        .bind(input.parent_id)
        .bind(input.sort_order)
        .bind(input.is_active)
        .bind(input.is_visible)
        .bind(&input.image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        Ok(Category::from(row))
    }

    async fn update(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError> {
        let Some(Some(parent)) = update.parent_id else {
            let row = update_query(id, update)
                .build_query_as::<CategoryRow>()
                .fetch_optional(&self.pool)
                .await
                .map_err(RepositoryError::from_sqlx)?;
            return Ok(row.map(Category::from));
        };

        // Reparents hold the tree lock; the ancestor check and the write
        // see the same tree.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CATEGORY_TREE_LOCK)
            .execute(&mut *tx)
            .await?;

        let cycle: bool = sqlx::query_scalar(PARENT_CREATES_CYCLE_SQL)
            .bind(parent)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if cycle {
            return Err(RepositoryError::Cycle);
        }

        let row = update_query(id, update)
            .build_query_as::<CategoryRow>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        tx.commit().await?;

        Ok(row.map(Category::from))
    }

    async fn delete(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_children(&self, id: CategoryId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories WHERE parent_id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn set_highlighted(
        &self,
        ids: Vec<CategoryId>,
        highlighted: bool,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE categories
            SET is_highlighted = $1,
                highlight_priority = CASE WHEN $1 THEN highlight_priority ELSE NULL END,
                updated_at = now()
            WHERE id = ANY($2)
            ",
        )
        .bind(highlighted)
        .bind(ids_to_i32(&ids))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_highlight_priority(
        &self,
        id: CategoryId,
        priority: i32,
    ) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            r"
            UPDATE categories
            SET highlight_priority = $2, updated_at = now()
            WHERE id = $1 AND is_highlighted = TRUE
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(id)
        .bind(priority)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        Ok(row.map(Category::from))
    }

    async fn highlighted(&self, limit: i64) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(&format!(
            r"
            SELECT {CATEGORY_COLUMNS}
            FROM categories
            WHERE is_highlighted = TRUE AND is_active = TRUE AND is_visible = TRUE
            ORDER BY highlight_priority ASC NULLS LAST, sort_order, name, id
            LIMIT $1
            "
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn reorder(&self, order: Vec<(CategoryId, i32)>) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0;

        for (id, sort_order) in order {
            let result = sqlx::query(
                "UPDATE categories SET sort_order = $2, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(sort_order)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(changed)
    }

    async fn set_visibility(
        &self,
        id: CategoryId,
        visible: bool,
    ) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            r"
            UPDATE categories SET is_visible = $2, updated_at = now()
            WHERE id = $1
            RETURNING {CATEGORY_COLUMNS}
            "
        ))
        .bind(id)
        .bind(visible)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Category::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_only_requires_active_and_visible() {
        let query = list_query(CategoryFilter {
            active_only: true,
            ..CategoryFilter::default()
        });
        let sql = query.sql();

        assert!(sql.contains("is_active = TRUE AND is_visible = TRUE"));
        assert!(sql.ends_with("ORDER BY sort_order, name, id"));
    }

    #[test]
    fn test_unfiltered_listing_has_no_conditions() {
        let query = list_query(CategoryFilter::default());
        assert!(!query.sql().contains("is_active"));
        assert!(!query.sql().contains("parent_id ="));
    }

    #[test]
    fn test_parent_and_highlight_filters() {
        let query = list_query(CategoryFilter {
            parent_id: Some(CategoryId::new(3)),
            highlighted_only: true,
            ..CategoryFilter::default()
        });

        assert!(query.sql().contains("parent_id = $1"));
        assert!(query.sql().contains("is_highlighted = TRUE"));
    }

    #[test]
    fn test_update_only_sets_given_fields() {
        let query = update_query(
            CategoryId::new(4),
            CategoryUpdate {
                name: Some("Teas".to_string()),
                parent_id: Some(None),
                ..CategoryUpdate::default()
            },
        );
        let sql = query.sql();

        assert!(sql.starts_with("UPDATE categories SET updated_at = now(), name = $1"));
        assert!(sql.contains("parent_id = $2"));
        assert!(!sql.contains("slug ="));
        assert!(sql.contains("WHERE id = $3"));
    }

    #[test]
    fn test_cycle_check_walks_ancestors_of_new_parent() {
        let sql = PARENT_CREATES_CYCLE_SQL;

        assert!(sql.contains("WITH RECURSIVE ancestors"));
        assert!(sql.contains("WHERE id = $1"));
        assert!(sql.contains("JOIN ancestors a ON c.id = a.parent_id"));
        assert!(sql.contains("UNION\n"), "UNION ALL would loop on a corrupt tree");
        assert!(sql.contains("WHERE id = $2)"));
    }
}
